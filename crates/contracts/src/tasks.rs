// Task-management domain contracts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::events::ChangeSet;
use crate::pagination::{Page, PageRequest};
use crate::pattern::RpcPattern;
use crate::rpc::RpcContract;

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    #[serde(default)]
    pub assignee_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
    Commented,
}

/// Audit trail row for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub task_id: Uuid,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeSet>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Payloads and results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TasksCreatePayload {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assignee_ids: Vec<Uuid>,
    /// Authenticated user issuing the request
    pub actor_id: Uuid,
}

/// The created task.
pub type TasksCreateResult = Task;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TasksFindAllPayload {
    #[serde(flatten)]
    pub pagination: PageRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct TasksFindOnePayload {
    pub id: Uuid,
}

/// Fields to change. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_ids: Option<Vec<Uuid>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self == &TaskPatch::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TasksUpdatePayload {
    pub id: Uuid,
    pub changes: TaskPatch,
    pub actor_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TasksDeletePayload {
    pub id: Uuid,
    pub actor_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct TasksDeleteResult {
    pub id: Uuid,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TasksCommentCreatePayload {
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TasksCommentFindAllPayload {
    pub task_id: Uuid,
    #[serde(flatten)]
    pub pagination: PageRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TasksHistoryPayload {
    pub task_id: Uuid,
    #[serde(flatten)]
    pub pagination: PageRequest,
}

// ============================================================================
// Contract bindings
// ============================================================================

pub struct TasksCreate;

impl RpcContract for TasksCreate {
    const PATTERN: RpcPattern = RpcPattern::TasksCreate;
    type Payload = TasksCreatePayload;
    type Response = TasksCreateResult;
}

pub struct TasksFindAll;

impl RpcContract for TasksFindAll {
    const PATTERN: RpcPattern = RpcPattern::TasksFindAll;
    type Payload = TasksFindAllPayload;
    type Response = Page<Task>;
}

pub struct TasksFindOne;

impl RpcContract for TasksFindOne {
    const PATTERN: RpcPattern = RpcPattern::TasksFindOne;
    type Payload = TasksFindOnePayload;
    type Response = Task;
}

pub struct TasksUpdate;

impl RpcContract for TasksUpdate {
    const PATTERN: RpcPattern = RpcPattern::TasksUpdate;
    type Payload = TasksUpdatePayload;
    type Response = Task;
}

pub struct TasksDelete;

impl RpcContract for TasksDelete {
    const PATTERN: RpcPattern = RpcPattern::TasksDelete;
    type Payload = TasksDeletePayload;
    type Response = TasksDeleteResult;
}

pub struct TasksCommentCreate;

impl RpcContract for TasksCommentCreate {
    const PATTERN: RpcPattern = RpcPattern::TasksCommentCreate;
    type Payload = TasksCommentCreatePayload;
    type Response = Comment;
}

pub struct TasksCommentFindAll;

impl RpcContract for TasksCommentFindAll {
    const PATTERN: RpcPattern = RpcPattern::TasksCommentFindAll;
    type Payload = TasksCommentFindAllPayload;
    type Response = Page<Comment>;
}

pub struct TasksHistory;

impl RpcContract for TasksHistory {
    const PATTERN: RpcPattern = RpcPattern::TasksHistory;
    type Payload = TasksHistoryPayload;
    type Response = Page<AuditEntry>;
}
