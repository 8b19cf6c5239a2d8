// Domain events and gateway forwarding events
//
// A DomainEventEnvelope is raised by the owning service once a mutation has
// committed. The forwarding pipeline turns each envelope into at most one
// ForwardingEvent addressed to a non-empty set of recipients.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::correlation::{CorrelationContext, CorrelationId};
use crate::pattern::{EventPattern, GatewayPattern};
use crate::tasks::{Comment, Task};

// ============================================================================
// Change sets
// ============================================================================

/// One changed field, values in their wire representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field: String,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
}

impl FieldChange {
    pub fn new(
        field: impl Into<String>,
        old_value: serde_json::Value,
        new_value: serde_json::Value,
    ) -> Self {
        Self {
            field: field.into(),
            old_value,
            new_value,
        }
    }
}

/// Audit detail attached to an event: a structured field list or an opaque map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(untagged)]
pub enum ChangeSet {
    Fields(Vec<FieldChange>),
    Opaque(BTreeMap<String, serde_json::Value>),
}

impl ChangeSet {
    /// Look up a structured change by field name.
    pub fn field(&self, name: &str) -> Option<&FieldChange> {
        match self {
            ChangeSet::Fields(fields) => fields.iter().find(|c| c.field == name),
            ChangeSet::Opaque(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ChangeSet::Fields(fields) => fields.is_empty(),
            ChangeSet::Opaque(map) => map.is_empty(),
        }
    }
}

// ============================================================================
// Domain Event Envelope
// ============================================================================

/// Full post-change representation of the affected entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum EntitySnapshot {
    Task(Task),
    Comment(Comment),
}

impl EntitySnapshot {
    pub fn id(&self) -> Uuid {
        match self {
            EntitySnapshot::Task(task) => task.id,
            EntitySnapshot::Comment(comment) => comment.id,
        }
    }

    /// Task the entity belongs to (the task itself for task snapshots).
    pub fn task_id(&self) -> Uuid {
        match self {
            EntitySnapshot::Task(task) => task.id,
            EntitySnapshot::Comment(comment) => comment.task_id,
        }
    }
}

/// Internal record of a committed state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct DomainEventEnvelope {
    /// Unique event identifier (UUID v7, sortable by creation time)
    pub id: Uuid,
    pub pattern: EventPattern,
    /// Absent only for events raised by internal background work
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<CorrelationContext>,
    pub entity: EntitySnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeSet>,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEventEnvelope {
    fn new(
        pattern: EventPattern,
        correlation: Option<CorrelationContext>,
        entity: EntitySnapshot,
        actor: Option<Uuid>,
        changes: Option<ChangeSet>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            pattern,
            correlation,
            entity,
            actor,
            changes,
            occurred_at: Utc::now(),
        }
    }

    pub fn task_created(
        task: Task,
        actor: Option<Uuid>,
        correlation: Option<CorrelationContext>,
    ) -> Self {
        Self::new(
            EventPattern::TaskCreated,
            correlation,
            EntitySnapshot::Task(task),
            actor,
            None,
        )
    }

    pub fn task_updated(
        task: Task,
        actor: Option<Uuid>,
        changes: ChangeSet,
        correlation: Option<CorrelationContext>,
    ) -> Self {
        Self::new(
            EventPattern::TaskUpdated,
            correlation,
            EntitySnapshot::Task(task),
            actor,
            Some(changes),
        )
    }

    pub fn task_deleted(
        task: Task,
        actor: Option<Uuid>,
        correlation: Option<CorrelationContext>,
    ) -> Self {
        Self::new(
            EventPattern::TaskDeleted,
            correlation,
            EntitySnapshot::Task(task),
            actor,
            None,
        )
    }

    pub fn comment_created(comment: Comment, correlation: Option<CorrelationContext>) -> Self {
        let actor = Some(comment.author_id);
        Self::new(
            EventPattern::CommentCreated,
            correlation,
            EntitySnapshot::Comment(comment),
            actor,
            None,
        )
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation.as_ref().map(|c| &c.id)
    }
}

// ============================================================================
// Forwarding Event
// ============================================================================

/// Returned when an empty audience is offered as recipients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("recipient set must not be empty")]
pub struct NoRecipients;

/// Non-empty set of user ids a forwarding event is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(try_from = "BTreeSet<Uuid>", into = "BTreeSet<Uuid>")]
pub struct Recipients(BTreeSet<Uuid>);

impl Recipients {
    pub fn new(ids: impl IntoIterator<Item = Uuid>) -> Result<Self, NoRecipients> {
        let set: BTreeSet<Uuid> = ids.into_iter().collect();
        if set.is_empty() {
            return Err(NoRecipients);
        }
        Ok(Self(set))
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with collections.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Uuid> {
        self.0.iter()
    }
}

impl TryFrom<BTreeSet<Uuid>> for Recipients {
    type Error = NoRecipients;

    fn try_from(set: BTreeSet<Uuid>) -> Result<Self, Self::Error> {
        Recipients::new(set)
    }
}

impl From<Recipients> for BTreeSet<Uuid> {
    fn from(recipients: Recipients) -> Self {
        recipients.0
    }
}

/// What a realtime client receives for a forwarded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ForwardedPayload {
    pub entity: EntitySnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeSet>,
}

/// Gateway-facing, recipient-addressed form of a domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ForwardingEvent {
    /// Same id as the source envelope, so re-forwarding can be recognised
    pub id: Uuid,
    pub pattern: GatewayPattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<CorrelationContext>,
    pub payload: ForwardedPayload,
    pub recipients: Recipients,
}

impl ForwardingEvent {
    /// Derive the forwarding event for an envelope (1:1).
    pub fn from_envelope(envelope: DomainEventEnvelope, recipients: Recipients) -> Self {
        Self {
            id: envelope.id,
            pattern: envelope.pattern.gateway_pattern(),
            correlation: envelope.correlation,
            payload: ForwardedPayload {
                entity: envelope.entity,
                actor: envelope.actor,
                changes: envelope.changes,
            },
            recipients,
        }
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation.as_ref().map(|c| &c.id)
    }
}
