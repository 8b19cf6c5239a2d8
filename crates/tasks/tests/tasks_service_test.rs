//! Tasks service behind the fabric: typed calls in, forwarding events out.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use taskwire_contracts::{
    AuditAction, CorrelationContext, CorrelationId, Domain, EntitySnapshot, FailureKind,
    GatewayPattern, Page, PageRequest, RpcCall, RpcOutcome, RpcPattern, Task, TaskPatch,
    TaskStatus, TasksCommentCreate, TasksCommentCreatePayload, TasksCreate, TasksCreatePayload,
    TasksDelete, TasksDeletePayload, TasksFindAll, TasksFindAllPayload, TasksFindOne,
    TasksFindOnePayload, TasksHistory, TasksHistoryPayload, TasksUpdate, TasksUpdatePayload,
};
use taskwire_fabric::{
    ClientSubscription, ContractRegistry, EventPipeline, FabricError, ForwardingOutcome,
    ForwardingState, GatewayRelay, LocalTransport, PipelineHandle, RecipientResolver, RpcClient,
    StaticResolver, Transport,
};
use taskwire_tasks::{InMemoryTaskStore, TaskAudienceResolver, TasksService};
use tokio::sync::broadcast;
use uuid::Uuid;

struct Stack {
    client: RpcClient,
    transport: Arc<LocalTransport>,
    relay: Arc<GatewayRelay>,
    pipeline: PipelineHandle,
    outcomes: broadcast::Receiver<ForwardingOutcome>,
}

fn stack_with(store: InMemoryTaskStore, resolver: Arc<dyn RecipientResolver>) -> Stack {
    let relay = Arc::new(GatewayRelay::default());
    let pipeline = EventPipeline::builder(resolver, relay.clone()).spawn();
    let outcomes = pipeline.subscribe();

    let registry = Arc::new(ContractRegistry::for_domain(Domain::Tasks).unwrap());
    let service = Arc::new(TasksService::new(store, pipeline.publisher()));
    let dispatcher = service.into_dispatcher(registry).unwrap();
    assert!(dispatcher.unhandled_patterns().is_empty());

    let transport =
        Arc::new(LocalTransport::new().with_service(Domain::Tasks, Arc::new(dispatcher)));

    Stack {
        client: RpcClient::new(transport.clone()),
        transport,
        relay,
        pipeline,
        outcomes,
    }
}

fn stack() -> Stack {
    let store = InMemoryTaskStore::new();
    stack_with(store.clone(), Arc::new(TaskAudienceResolver::new(store)))
}

fn new_task(title: &str, actor: Uuid, assignees: Vec<Uuid>) -> TasksCreatePayload {
    TasksCreatePayload {
        title: title.to_string(),
        description: Some("details".into()),
        status: None,
        priority: None,
        due_date: None,
        assignee_ids: assignees,
        actor_id: actor,
    }
}

async fn next_outcome(stack: &mut Stack) -> ForwardingOutcome {
    tokio::time::timeout(Duration::from_secs(2), stack.outcomes.recv())
        .await
        .expect("no forwarding outcome")
        .unwrap()
}

async fn next_message(sub: &mut ClientSubscription) -> taskwire_fabric::ClientMessage {
    tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("no client message")
        .unwrap()
}

#[test_log::test(tokio::test)]
async fn test_create_notifies_creator_and_assignee_tagged_with_caller_id() {
    let mut stack = stack();
    let (u1, u2) = (Uuid::now_v7(), Uuid::now_v7());
    let mut sub1 = stack.relay.connect(u1);
    let mut sub2 = stack.relay.connect(u2);
    let mut outsider = stack.relay.connect(Uuid::now_v7());

    let r1 = CorrelationContext::from_id(CorrelationId::parse("R1").unwrap());
    let task = stack
        .client
        .call::<TasksCreate>(&r1, &new_task("Write release notes", u1, vec![u2]))
        .await
        .unwrap();

    let outcome = next_outcome(&mut stack).await;
    assert_eq!(outcome.state(), ForwardingState::Forwarded);
    let event = outcome.forwarded().unwrap();
    assert_eq!(event.pattern, GatewayPattern::TaskCreated);
    assert_eq!(event.correlation_id().unwrap().as_str(), "R1");
    assert_eq!(event.recipients.len(), 2);
    assert!(event.recipients.contains(&u1) && event.recipients.contains(&u2));

    for sub in [&mut sub1, &mut sub2] {
        let message = next_message(sub).await;
        assert_eq!(message.correlation_id.unwrap().as_str(), "R1");
        assert!(matches!(
            message.payload.entity,
            EntitySnapshot::Task(ref t) if t.id == task.id
        ));
        assert_eq!(message.payload.actor, Some(u1));
    }
    assert!(outsider.try_recv().is_none());
}

#[test_log::test(tokio::test)]
async fn test_empty_audience_emits_nothing_but_call_succeeds() {
    let store = InMemoryTaskStore::new();
    let mut stack = stack_with(store.clone(), Arc::new(StaticResolver::empty()));
    let actor = Uuid::now_v7();
    let mut sub = stack.relay.connect(actor);

    let task = stack
        .client
        .call::<TasksCreate>(&CorrelationContext::new(), &new_task("Solo", actor, vec![]))
        .await
        .unwrap();
    assert_eq!(task.title, "Solo");
    assert_eq!(store.task_count().await, 1);

    let outcome = next_outcome(&mut stack).await;
    assert_eq!(outcome.state(), ForwardingState::Dropped);
    assert!(outcome.error().is_none());
    assert!(sub.try_recv().is_none());
}

#[test_log::test(tokio::test)]
async fn test_update_sends_field_changes_and_tells_removed_assignee() {
    let mut stack = stack();
    let (owner, old, new) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
    let ctx = CorrelationContext::new();

    let task = stack
        .client
        .call::<TasksCreate>(&ctx, &new_task("Rotate keys", owner, vec![old]))
        .await
        .unwrap();
    next_outcome(&mut stack).await;

    let mut removed = stack.relay.connect(old);
    let updated = stack
        .client
        .call::<TasksUpdate>(
            &ctx,
            &TasksUpdatePayload {
                id: task.id,
                changes: TaskPatch {
                    status: Some(TaskStatus::InProgress),
                    assignee_ids: Some(vec![new]),
                    ..Default::default()
                },
                actor_id: owner,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.assignee_ids, vec![new]);

    let outcome = next_outcome(&mut stack).await;
    let event = outcome.forwarded().unwrap();
    assert_eq!(event.pattern, GatewayPattern::TaskUpdated);
    assert!(event.recipients.contains(&old));
    assert!(event.recipients.contains(&new));

    let message = next_message(&mut removed).await;
    let changes = message.payload.changes.unwrap();
    let status = changes.field("status").unwrap();
    assert_eq!(status.old_value, json!("TODO"));
    assert_eq!(status.new_value, json!("IN_PROGRESS"));
    assert!(changes.field("assigneeIds").is_some());
}

#[test_log::test(tokio::test)]
async fn test_noop_update_raises_nothing() {
    let mut stack = stack();
    let owner = Uuid::now_v7();
    let ctx = CorrelationContext::new();
    let task = stack
        .client
        .call::<TasksCreate>(&ctx, &new_task("Stable", owner, vec![]))
        .await
        .unwrap();
    next_outcome(&mut stack).await;

    stack
        .client
        .call::<TasksUpdate>(
            &ctx,
            &TasksUpdatePayload {
                id: task.id,
                changes: TaskPatch {
                    title: Some("Stable".into()),
                    ..Default::default()
                },
                actor_id: owner,
            },
        )
        .await
        .unwrap();

    stack.pipeline.shutdown().await;
    assert_eq!(stack.pipeline.stats().raised, 1);
}

#[test_log::test(tokio::test)]
async fn test_comment_reaches_task_members_except_author() {
    let mut stack = stack();
    let (owner, assignee) = (Uuid::now_v7(), Uuid::now_v7());
    let ctx = CorrelationContext::new();
    let task = stack
        .client
        .call::<TasksCreate>(&ctx, &new_task("Pair on bug", owner, vec![assignee]))
        .await
        .unwrap();
    next_outcome(&mut stack).await;

    let mut owner_sub = stack.relay.connect(owner);
    let mut author_sub = stack.relay.connect(assignee);

    let comment = stack
        .client
        .call::<TasksCommentCreate>(
            &ctx,
            &TasksCommentCreatePayload {
                task_id: task.id,
                author_id: assignee,
                content: "Found it".into(),
            },
        )
        .await
        .unwrap();

    let message = next_message(&mut owner_sub).await;
    assert_eq!(message.event, GatewayPattern::CommentNew);
    assert_eq!(message.correlation_id, Some(ctx.id.clone()));
    assert!(matches!(
        message.payload.entity,
        EntitySnapshot::Comment(ref c) if c.id == comment.id
    ));
    assert!(author_sub.try_recv().is_none());
}

#[test_log::test(tokio::test)]
async fn test_find_all_pagination_over_the_wire() {
    let stack = stack();
    let actor = Uuid::now_v7();
    let ctx = CorrelationContext::new();
    for i in 0..25 {
        stack
            .client
            .call::<TasksCreate>(&ctx, &new_task(&format!("task {i}"), actor, vec![]))
            .await
            .unwrap();
    }

    let page = stack
        .client
        .call::<TasksFindAll>(
            &ctx,
            &TasksFindAllPayload {
                pagination: PageRequest::new(3, 10),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 25);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.data.len(), 5);

    // `limit` is accepted as an alias for `size`
    let call = RpcCall::new(
        RpcPattern::TasksFindAll,
        ctx.clone(),
        json!({ "page": 5, "limit": 10 }),
    );
    let reply = stack.transport.send(call).await.unwrap();
    let RpcOutcome::Ok { response } = reply.outcome else {
        panic!("findAll failed");
    };
    assert_eq!(response["totalPages"], json!(3));
    let past_end: Page<Task> = serde_json::from_value(response).unwrap();
    assert!(past_end.data.is_empty());
    assert_eq!(past_end.total, 25);
    assert_eq!(past_end.page, 5);

    // Defaults apply when nothing is requested
    let first = stack
        .client
        .call::<TasksFindAll>(&ctx, &TasksFindAllPayload::default())
        .await
        .unwrap();
    assert_eq!((first.page, first.size, first.data.len()), (1, 10, 10));
}

#[test_log::test(tokio::test)]
async fn test_history_survives_delete() {
    let mut stack = stack();
    let actor = Uuid::now_v7();
    let ctx = CorrelationContext::new();
    let task = stack
        .client
        .call::<TasksCreate>(&ctx, &new_task("Short lived", actor, vec![]))
        .await
        .unwrap();

    let deleted = stack
        .client
        .call::<TasksDelete>(
            &ctx,
            &TasksDeletePayload {
                id: task.id,
                actor_id: actor,
            },
        )
        .await
        .unwrap();
    assert!(deleted.deleted);

    // Created, then deleted: both forwarded to the creator
    assert_eq!(next_outcome(&mut stack).await.pattern.as_str(), "task.created");
    assert_eq!(next_outcome(&mut stack).await.pattern.as_str(), "task.deleted");

    let err = stack
        .client
        .call::<TasksFindOne>(&ctx, &TasksFindOnePayload { id: task.id })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FabricError::Remote {
            kind: FailureKind::NotFound,
            ..
        }
    ));

    let history = stack
        .client
        .call::<TasksHistory>(
            &ctx,
            &TasksHistoryPayload {
                task_id: task.id,
                pagination: PageRequest::default(),
            },
        )
        .await
        .unwrap();
    let actions: Vec<_> = history.data.iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![AuditAction::Created, AuditAction::Deleted]);
}

#[test_log::test(tokio::test)]
async fn test_blank_title_rejected_without_commit() {
    let store = InMemoryTaskStore::new();
    let stack = stack_with(store.clone(), Arc::new(StaticResolver::empty()));

    let err = stack
        .client
        .call::<TasksCreate>(
            &CorrelationContext::new(),
            &new_task("   ", Uuid::now_v7(), vec![]),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FabricError::Remote {
            kind: FailureKind::Rejected,
            ..
        }
    ));
    assert_eq!(store.task_count().await, 0);
}

#[test_log::test(tokio::test)]
async fn test_closed_pipeline_does_not_fail_mutation() {
    let store = InMemoryTaskStore::new();
    let stack = stack_with(store.clone(), Arc::new(StaticResolver::new([Uuid::now_v7()])));
    stack.pipeline.shutdown().await;

    let task = stack
        .client
        .call::<TasksCreate>(
            &CorrelationContext::new(),
            &new_task("After hours", Uuid::now_v7(), vec![]),
        )
        .await
        .unwrap();

    assert_eq!(store.task_count().await, 1);
    assert_eq!(task.title, "After hours");
}

#[test_log::test(tokio::test)]
async fn test_store_outage_drops_comment_event_after_retries() {
    let store = InMemoryTaskStore::new();
    let resolver = Arc::new(TaskAudienceResolver::new(store.clone()));
    let relay = Arc::new(GatewayRelay::default());
    let pipeline = EventPipeline::builder(resolver, relay)
        .config(
            taskwire_fabric::PipelineConfig::default().with_resolver_retry(
                taskwire_fabric::RetryPolicy::fixed(Duration::from_millis(5), 3),
            ),
        )
        .spawn();
    let mut outcomes = pipeline.subscribe();

    let service = TasksService::new(store.clone(), pipeline.publisher());
    let ctx = taskwire_fabric::CallContext {
        pattern: RpcPattern::TasksCreate,
        correlation: CorrelationContext::new(),
    };
    let task = service
        .create(ctx.clone(), new_task("Flaky", Uuid::now_v7(), vec![]))
        .await
        .unwrap();
    assert_eq!(outcomes.recv().await.unwrap().state(), ForwardingState::Forwarded);

    // Comment commits, then membership lookups start failing
    let comment = service
        .store()
        .add_comment(task.id, Uuid::now_v7(), "ping".into())
        .await
        .unwrap();
    store.set_offline(true);
    pipeline
        .publisher()
        .raise(taskwire_contracts::DomainEventEnvelope::comment_created(
            comment,
            Some(ctx.correlation.clone()),
        ))
        .unwrap();

    let outcome = outcomes.recv().await.unwrap();
    assert_eq!(outcome.state(), ForwardingState::Dropped);
    assert!(matches!(
        outcome.error(),
        Some(FabricError::ForwardingFailed { .. })
    ));
}
