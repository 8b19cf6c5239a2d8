// In-memory task store
//
// Holds tasks, their comments and their audit trail. Every mutation appends
// an audit entry under the same write lock, so history never disagrees with
// the committed state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use taskwire_contracts::{
    AuditAction, AuditEntry, ChangeSet, Comment, FieldChange, Page, PageWindow, Task, TaskPatch,
    TasksCreatePayload, TasksFindAllPayload,
};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
pub enum TaskStoreError {
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("task store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, TaskStoreError>;

#[derive(Debug, Default)]
struct Tables {
    tasks: HashMap<Uuid, Task>,
    /// Task ids in creation order
    order: Vec<Uuid>,
    comments: HashMap<Uuid, Vec<Comment>>,
    audit: HashMap<Uuid, Vec<AuditEntry>>,
}

impl Tables {
    fn record(
        &mut self,
        task_id: Uuid,
        action: AuditAction,
        actor_id: Option<Uuid>,
        changes: Option<ChangeSet>,
    ) {
        self.audit.entry(task_id).or_default().push(AuditEntry {
            id: Uuid::now_v7(),
            task_id,
            action,
            actor_id,
            changes,
            created_at: Utc::now(),
        });
    }
}

// ============================================================================
// InMemoryTaskStore
// ============================================================================

/// In-memory task store
///
/// Cheap to clone; clones share the same tables.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTaskStore {
    tables: Arc<RwLock<Tables>>,
    offline: Arc<AtomicBool>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read and write fail with `Unavailable` (for outage tests)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TaskStoreError::Unavailable("store is offline".into()));
        }
        Ok(())
    }

    pub async fn create(&self, payload: TasksCreatePayload) -> StoreResult<Task> {
        self.check_online()?;

        let now = Utc::now();
        let mut assignee_ids = payload.assignee_ids;
        dedup_in_order(&mut assignee_ids);

        let task = Task {
            id: Uuid::now_v7(),
            title: payload.title,
            description: payload.description,
            status: payload.status.unwrap_or_default(),
            priority: payload.priority.unwrap_or_default(),
            due_date: payload.due_date,
            created_by: payload.actor_id,
            assignee_ids,
            created_at: now,
            updated_at: now,
        };

        let mut tables = self.tables.write().await;
        tables.tasks.insert(task.id, task.clone());
        tables.order.push(task.id);
        tables.record(task.id, AuditAction::Created, Some(payload.actor_id), None);
        Ok(task)
    }

    pub async fn get(&self, id: Uuid) -> StoreResult<Option<Task>> {
        self.check_online()?;
        Ok(self.tables.read().await.tasks.get(&id).cloned())
    }

    /// Newest first, filtered by status, priority and assignee
    pub async fn list(
        &self,
        filter: &TasksFindAllPayload,
        window: PageWindow,
    ) -> StoreResult<Page<Task>> {
        self.check_online()?;

        let tables = self.tables.read().await;
        let matching: Vec<Task> = tables
            .order
            .iter()
            .rev()
            .filter_map(|id| tables.tasks.get(id))
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.priority.map_or(true, |p| t.priority == p))
            .filter(|t| {
                filter
                    .assignee_id
                    .map_or(true, |a| t.assignee_ids.contains(&a))
            })
            .cloned()
            .collect();

        Ok(Page::paginate(matching, window))
    }

    /// Apply `patch`, returning the new task and the fields that changed
    ///
    /// A patch that changes nothing leaves the task and its history untouched.
    pub async fn update(
        &self,
        id: Uuid,
        patch: TaskPatch,
        actor_id: Uuid,
    ) -> StoreResult<(Task, Vec<FieldChange>)> {
        self.check_online()?;

        let mut tables = self.tables.write().await;
        let task = tables
            .tasks
            .get_mut(&id)
            .ok_or(TaskStoreError::TaskNotFound(id))?;

        let mut changes = Vec::new();

        if let Some(title) = patch.title {
            track(&mut changes, "title", &mut task.title, title);
        }
        if let Some(description) = patch.description {
            track(&mut changes, "description", &mut task.description, Some(description));
        }
        if let Some(status) = patch.status {
            track(&mut changes, "status", &mut task.status, status);
        }
        if let Some(priority) = patch.priority {
            track(&mut changes, "priority", &mut task.priority, priority);
        }
        if let Some(due_date) = patch.due_date {
            track(&mut changes, "dueDate", &mut task.due_date, Some(due_date));
        }
        if let Some(mut assignee_ids) = patch.assignee_ids {
            dedup_in_order(&mut assignee_ids);
            track(&mut changes, "assigneeIds", &mut task.assignee_ids, assignee_ids);
        }

        if changes.is_empty() {
            return Ok((task.clone(), changes));
        }

        task.updated_at = Utc::now();
        let updated = task.clone();
        tables.record(
            id,
            AuditAction::Updated,
            Some(actor_id),
            Some(ChangeSet::Fields(changes.clone())),
        );
        Ok((updated, changes))
    }

    /// Remove a task and its comments. Its audit trail is kept.
    pub async fn delete(&self, id: Uuid, actor_id: Uuid) -> StoreResult<Task> {
        self.check_online()?;

        let mut tables = self.tables.write().await;
        let task = tables
            .tasks
            .remove(&id)
            .ok_or(TaskStoreError::TaskNotFound(id))?;
        tables.order.retain(|t| *t != id);
        tables.comments.remove(&id);
        tables.record(id, AuditAction::Deleted, Some(actor_id), None);
        Ok(task)
    }

    pub async fn add_comment(
        &self,
        task_id: Uuid,
        author_id: Uuid,
        content: String,
    ) -> StoreResult<Comment> {
        self.check_online()?;

        let mut tables = self.tables.write().await;
        if !tables.tasks.contains_key(&task_id) {
            return Err(TaskStoreError::TaskNotFound(task_id));
        }

        let comment = Comment {
            id: Uuid::now_v7(),
            task_id,
            author_id,
            content,
            created_at: Utc::now(),
        };
        tables
            .comments
            .entry(task_id)
            .or_default()
            .push(comment.clone());

        let mut details = std::collections::BTreeMap::new();
        details.insert("commentId".to_string(), Value::String(comment.id.to_string()));
        tables.record(
            task_id,
            AuditAction::Commented,
            Some(author_id),
            Some(ChangeSet::Opaque(details)),
        );
        Ok(comment)
    }

    /// Oldest first
    pub async fn comments(&self, task_id: Uuid, window: PageWindow) -> StoreResult<Page<Comment>> {
        self.check_online()?;

        let tables = self.tables.read().await;
        if !tables.tasks.contains_key(&task_id) {
            return Err(TaskStoreError::TaskNotFound(task_id));
        }
        let comments = tables.comments.get(&task_id).cloned().unwrap_or_default();
        Ok(Page::paginate(comments, window))
    }

    /// Audit trail, oldest first. Available after the task is deleted.
    pub async fn history(
        &self,
        task_id: Uuid,
        window: PageWindow,
    ) -> StoreResult<Page<AuditEntry>> {
        self.check_online()?;

        let tables = self.tables.read().await;
        let entries = tables.audit.get(&task_id).cloned().unwrap_or_default();
        Ok(Page::paginate(entries, window))
    }

    pub async fn task_count(&self) -> usize {
        self.tables.read().await.tasks.len()
    }
}

/// Overwrite `slot` with `new`, noting the change if the value differs
fn track<T>(changes: &mut Vec<FieldChange>, field: &str, slot: &mut T, new: T)
where
    T: PartialEq + Serialize,
{
    if *slot == new {
        return;
    }
    let old = std::mem::replace(slot, new);
    changes.push(FieldChange::new(field, to_value(&old), to_value(slot)));
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn dedup_in_order(ids: &mut Vec<Uuid>) {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
}
