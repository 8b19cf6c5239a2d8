//! Tasks service
//!
//! Serves every `tasks.*` pattern. Each mutation commits to the store
//! first and only then raises its domain event, carrying the correlation of
//! the call that caused it. Raising is a cheap enqueue; forwarding happens
//! on the pipeline's own tasks and never delays or fails the reply.

use std::sync::Arc;

use taskwire_contracts::{
    AuditEntry, ChangeSet, Comment, DomainEventEnvelope, Page, Task, TasksCommentCreate,
    TasksCommentCreatePayload, TasksCommentFindAll, TasksCommentFindAllPayload, TasksCreate,
    TasksCreatePayload, TasksDelete, TasksDeletePayload, TasksDeleteResult, TasksFindAll,
    TasksFindAllPayload, TasksFindOne, TasksFindOnePayload, TasksHistory, TasksHistoryPayload,
    TasksUpdate, TasksUpdatePayload, DEFAULT_PAGE_SIZE,
};
use taskwire_fabric::{
    CallContext, ContractRegistry, EventPublisher, HandlerError, RpcDispatcher,
};
use tracing::{info, instrument, warn};

use crate::store::{InMemoryTaskStore, TaskStoreError};

impl From<TaskStoreError> for HandlerError {
    fn from(err: TaskStoreError) -> Self {
        match err {
            TaskStoreError::TaskNotFound(id) => HandlerError::not_found(format!("task {id}")),
            TaskStoreError::Unavailable(msg) => HandlerError::internal(msg),
        }
    }
}

pub struct TasksService {
    store: InMemoryTaskStore,
    events: EventPublisher,
    default_page_size: u32,
}

impl TasksService {
    pub fn new(store: InMemoryTaskStore, events: EventPublisher) -> Self {
        Self {
            store,
            events,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_default_page_size(mut self, size: u32) -> Self {
        self.default_page_size = size;
        self
    }

    pub fn store(&self) -> &InMemoryTaskStore {
        &self.store
    }

    /// Dispatcher serving every tasks contract in `registry`
    pub fn into_dispatcher(
        self: Arc<Self>,
        registry: Arc<ContractRegistry>,
    ) -> taskwire_fabric::Result<RpcDispatcher> {
        let create = Arc::clone(&self);
        let find_all = Arc::clone(&self);
        let find_one = Arc::clone(&self);
        let update = Arc::clone(&self);
        let delete = Arc::clone(&self);
        let comment = Arc::clone(&self);
        let comments = Arc::clone(&self);
        let history = self;

        Ok(RpcDispatcher::builder(registry)
            .handle::<TasksCreate, _, _>(move |ctx, payload| {
                let svc = Arc::clone(&create);
                async move { svc.create(ctx, payload).await }
            })?
            .handle::<TasksFindAll, _, _>(move |ctx, payload| {
                let svc = Arc::clone(&find_all);
                async move { svc.find_all(ctx, payload).await }
            })?
            .handle::<TasksFindOne, _, _>(move |ctx, payload| {
                let svc = Arc::clone(&find_one);
                async move { svc.find_one(ctx, payload).await }
            })?
            .handle::<TasksUpdate, _, _>(move |ctx, payload| {
                let svc = Arc::clone(&update);
                async move { svc.update(ctx, payload).await }
            })?
            .handle::<TasksDelete, _, _>(move |ctx, payload| {
                let svc = Arc::clone(&delete);
                async move { svc.delete(ctx, payload).await }
            })?
            .handle::<TasksCommentCreate, _, _>(move |ctx, payload| {
                let svc = Arc::clone(&comment);
                async move { svc.create_comment(ctx, payload).await }
            })?
            .handle::<TasksCommentFindAll, _, _>(move |ctx, payload| {
                let svc = Arc::clone(&comments);
                async move { svc.find_comments(ctx, payload).await }
            })?
            .handle::<TasksHistory, _, _>(move |ctx, payload| {
                let svc = Arc::clone(&history);
                async move { svc.history(ctx, payload).await }
            })?
            .build())
    }

    /// Hand an envelope to the pipeline; failure is logged, never returned
    fn raise(&self, envelope: DomainEventEnvelope) {
        let event_id = envelope.id;
        let pattern = envelope.pattern;
        if let Err(e) = self.events.raise(envelope) {
            warn!(%event_id, %pattern, error = %e, "could not raise domain event");
        }
    }

    #[instrument(skip_all, fields(correlation_id = %ctx.correlation.id))]
    pub async fn create(
        &self,
        ctx: CallContext,
        payload: TasksCreatePayload,
    ) -> Result<Task, HandlerError> {
        if payload.title.trim().is_empty() {
            return Err(HandlerError::rejected("title must not be empty"));
        }

        let actor = payload.actor_id;
        let task = self.store.create(payload).await?;
        info!(task_id = %task.id, "task created");

        self.raise(DomainEventEnvelope::task_created(
            task.clone(),
            Some(actor),
            Some(ctx.correlation.forward()),
        ));
        Ok(task)
    }

    pub async fn find_all(
        &self,
        _ctx: CallContext,
        payload: TasksFindAllPayload,
    ) -> Result<Page<Task>, HandlerError> {
        let window = payload.pagination.resolve(self.default_page_size);
        Ok(self.store.list(&payload, window).await?)
    }

    pub async fn find_one(
        &self,
        _ctx: CallContext,
        payload: TasksFindOnePayload,
    ) -> Result<Task, HandlerError> {
        self.store
            .get(payload.id)
            .await?
            .ok_or_else(|| HandlerError::not_found(format!("task {}", payload.id)))
    }

    #[instrument(skip_all, fields(correlation_id = %ctx.correlation.id, task_id = %payload.id))]
    pub async fn update(
        &self,
        ctx: CallContext,
        payload: TasksUpdatePayload,
    ) -> Result<Task, HandlerError> {
        if payload
            .changes
            .title
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            return Err(HandlerError::rejected("title must not be empty"));
        }

        let (task, changes) = self
            .store
            .update(payload.id, payload.changes, payload.actor_id)
            .await?;

        if changes.is_empty() {
            return Ok(task);
        }
        info!(fields = changes.len(), "task updated");

        self.raise(DomainEventEnvelope::task_updated(
            task.clone(),
            Some(payload.actor_id),
            ChangeSet::Fields(changes),
            Some(ctx.correlation.forward()),
        ));
        Ok(task)
    }

    #[instrument(skip_all, fields(correlation_id = %ctx.correlation.id, task_id = %payload.id))]
    pub async fn delete(
        &self,
        ctx: CallContext,
        payload: TasksDeletePayload,
    ) -> Result<TasksDeleteResult, HandlerError> {
        let task = self.store.delete(payload.id, payload.actor_id).await?;
        info!("task deleted");

        self.raise(DomainEventEnvelope::task_deleted(
            task,
            Some(payload.actor_id),
            Some(ctx.correlation.forward()),
        ));
        Ok(TasksDeleteResult {
            id: payload.id,
            deleted: true,
        })
    }

    #[instrument(skip_all, fields(correlation_id = %ctx.correlation.id, task_id = %payload.task_id))]
    pub async fn create_comment(
        &self,
        ctx: CallContext,
        payload: TasksCommentCreatePayload,
    ) -> Result<Comment, HandlerError> {
        if payload.content.trim().is_empty() {
            return Err(HandlerError::rejected("comment must not be empty"));
        }

        let comment = self
            .store
            .add_comment(payload.task_id, payload.author_id, payload.content)
            .await?;
        info!(comment_id = %comment.id, "comment created");

        self.raise(DomainEventEnvelope::comment_created(
            comment.clone(),
            Some(ctx.correlation.forward()),
        ));
        Ok(comment)
    }

    pub async fn find_comments(
        &self,
        _ctx: CallContext,
        payload: TasksCommentFindAllPayload,
    ) -> Result<Page<Comment>, HandlerError> {
        let window = payload.pagination.resolve(self.default_page_size);
        Ok(self.store.comments(payload.task_id, window).await?)
    }

    pub async fn history(
        &self,
        _ctx: CallContext,
        payload: TasksHistoryPayload,
    ) -> Result<Page<AuditEntry>, HandlerError> {
        let window = payload.pagination.resolve(self.default_page_size);
        Ok(self.store.history(payload.task_id, window).await?)
    }
}
