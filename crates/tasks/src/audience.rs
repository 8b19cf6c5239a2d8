// Audience resolution for task events
//
// Who hears about a change:
// - task events: the creator, current assignees, and anyone the change
//   removed from the assignee list
// - comment events: the owning task's creator and assignees, minus the author

use std::collections::BTreeSet;

use async_trait::async_trait;
use taskwire_contracts::{ChangeSet, EntitySnapshot, Task};
use taskwire_fabric::{FabricError, RecipientResolver};
use tracing::debug;
use uuid::Uuid;

use crate::store::{InMemoryTaskStore, TaskStoreError};

/// Read access to tasks for audience resolution
#[async_trait]
pub trait TaskLookup: Send + Sync {
    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, TaskStoreError>;
}

#[async_trait]
impl TaskLookup for InMemoryTaskStore {
    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, TaskStoreError> {
        self.get(id).await
    }
}

pub struct TaskAudienceResolver<L> {
    lookup: L,
}

impl<L: TaskLookup> TaskAudienceResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl<L: TaskLookup> RecipientResolver for TaskAudienceResolver<L> {
    async fn resolve(
        &self,
        entity: &EntitySnapshot,
        changes: Option<&ChangeSet>,
    ) -> taskwire_fabric::Result<BTreeSet<Uuid>> {
        match entity {
            EntitySnapshot::Task(task) => {
                let mut audience = task_members(task);
                audience.extend(removed_assignees(changes));
                Ok(audience)
            }
            EntitySnapshot::Comment(comment) => {
                let task = self
                    .lookup
                    .find_task(comment.task_id)
                    .await
                    .map_err(|e| FabricError::resolver(e.to_string()))?;

                let Some(task) = task else {
                    debug!(task_id = %comment.task_id, "comment on missing task");
                    return Ok(BTreeSet::new());
                };

                let mut audience = task_members(&task);
                audience.remove(&comment.author_id);
                Ok(audience)
            }
        }
    }

    fn name(&self) -> &'static str {
        "TaskAudienceResolver"
    }
}

fn task_members(task: &Task) -> BTreeSet<Uuid> {
    std::iter::once(task.created_by)
        .chain(task.assignee_ids.iter().copied())
        .collect()
}

/// Assignees present in the old `assigneeIds` value but not the new one
fn removed_assignees(changes: Option<&ChangeSet>) -> Vec<Uuid> {
    let Some(change) = changes.and_then(|c| c.field("assigneeIds")) else {
        return Vec::new();
    };

    let parse = |value: &serde_json::Value| -> Vec<Uuid> {
        serde_json::from_value(value.clone()).unwrap_or_default()
    };
    let current = parse(&change.new_value);
    parse(&change.old_value)
        .into_iter()
        .filter(|id| !current.contains(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use taskwire_contracts::{Comment, FieldChange, TaskPriority, TaskStatus, TasksCreatePayload};

    fn task(created_by: Uuid, assignees: Vec<Uuid>) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::now_v7(),
            title: "Review".into(),
            description: None,
            status: TaskStatus::Review,
            priority: TaskPriority::High,
            due_date: None,
            created_by,
            assignee_ids: assignees,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_task_audience_includes_creator_and_assignees() {
        let resolver = TaskAudienceResolver::new(InMemoryTaskStore::new());
        let (creator, a, b) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());

        let audience = resolver
            .resolve(&EntitySnapshot::Task(task(creator, vec![a, b])), None)
            .await
            .unwrap();

        assert_eq!(audience, BTreeSet::from([creator, a, b]));
    }

    #[tokio::test]
    async fn test_removed_assignee_is_told() {
        let resolver = TaskAudienceResolver::new(InMemoryTaskStore::new());
        let (creator, kept, removed) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let changes = ChangeSet::Fields(vec![FieldChange::new(
            "assigneeIds",
            json!([kept, removed]),
            json!([kept]),
        )]);

        let audience = resolver
            .resolve(
                &EntitySnapshot::Task(task(creator, vec![kept])),
                Some(&changes),
            )
            .await
            .unwrap();

        assert!(audience.contains(&removed));
        assert_eq!(audience.len(), 3);
    }

    #[tokio::test]
    async fn test_comment_audience_excludes_author() {
        let store = InMemoryTaskStore::new();
        let (creator, assignee) = (Uuid::now_v7(), Uuid::now_v7());
        let owning = store
            .create(TasksCreatePayload {
                title: "Discuss".into(),
                description: None,
                status: None,
                priority: None,
                due_date: None,
                assignee_ids: vec![assignee],
                actor_id: creator,
            })
            .await
            .unwrap();
        let resolver = TaskAudienceResolver::new(store);

        let comment = Comment {
            id: Uuid::now_v7(),
            task_id: owning.id,
            author_id: assignee,
            content: "done".into(),
            created_at: Utc::now(),
        };
        let audience = resolver
            .resolve(&EntitySnapshot::Comment(comment), None)
            .await
            .unwrap();

        assert_eq!(audience, BTreeSet::from([creator]));
    }

    #[tokio::test]
    async fn test_comment_on_missing_task_has_no_audience() {
        let resolver = TaskAudienceResolver::new(InMemoryTaskStore::new());
        let comment = Comment {
            id: Uuid::now_v7(),
            task_id: Uuid::now_v7(),
            author_id: Uuid::now_v7(),
            content: "anyone?".into(),
            created_at: Utc::now(),
        };

        let audience = resolver
            .resolve(&EntitySnapshot::Comment(comment), None)
            .await
            .unwrap();
        assert!(audience.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_is_resolver_unavailable() {
        let store = InMemoryTaskStore::new();
        store.set_offline(true);
        let resolver = TaskAudienceResolver::new(store);
        let comment = Comment {
            id: Uuid::now_v7(),
            task_id: Uuid::now_v7(),
            author_id: Uuid::now_v7(),
            content: "hello".into(),
            created_at: Utc::now(),
        };

        let err = resolver
            .resolve(&EntitySnapshot::Comment(comment), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FabricError::ResolverUnavailable(_)));
    }
}
