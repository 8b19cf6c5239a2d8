// Pattern catalog
//
// Every operation and event kind is identified on the wire by a stable,
// domain-scoped, dot-separated string. Renaming one of these strings is a
// breaking contract change: add a new variant instead.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

// ============================================================================
// Domain
// ============================================================================

/// Service domain that owns a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Identity,
    Tasks,
    Notifications,
    Gateway,
}

impl Domain {
    pub const ALL: [Domain; 4] = [
        Domain::Identity,
        Domain::Tasks,
        Domain::Notifications,
        Domain::Gateway,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Identity => "identity",
            Domain::Tasks => "tasks",
            Domain::Notifications => "notifications",
            Domain::Gateway => "gateway",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a wire string does not name a known pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pattern: {0}")]
pub struct UnknownPattern(pub String);

// ============================================================================
// RPC patterns
// ============================================================================

/// Request/response operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub enum RpcPattern {
    // identity
    #[serde(rename = "auth.register")]
    AuthRegister,
    #[serde(rename = "auth.login")]
    AuthLogin,
    #[serde(rename = "auth.refresh")]
    AuthRefresh,
    #[serde(rename = "auth.validate")]
    AuthValidate,
    #[serde(rename = "users.findAll")]
    UsersFindAll,
    #[serde(rename = "users.findByIds")]
    UsersFindByIds,

    // tasks
    #[serde(rename = "tasks.create")]
    TasksCreate,
    #[serde(rename = "tasks.findAll")]
    TasksFindAll,
    #[serde(rename = "tasks.findOne")]
    TasksFindOne,
    #[serde(rename = "tasks.update")]
    TasksUpdate,
    #[serde(rename = "tasks.delete")]
    TasksDelete,
    #[serde(rename = "tasks.comment.create")]
    TasksCommentCreate,
    #[serde(rename = "tasks.comment.findAll")]
    TasksCommentFindAll,
    #[serde(rename = "tasks.history")]
    TasksHistory,

    // notifications
    #[serde(rename = "notifications.findAll")]
    NotificationsFindAll,
    #[serde(rename = "notifications.markRead")]
    NotificationsMarkRead,
    #[serde(rename = "notifications.markAllRead")]
    NotificationsMarkAllRead,
}

impl RpcPattern {
    pub const ALL: [RpcPattern; 17] = [
        RpcPattern::AuthRegister,
        RpcPattern::AuthLogin,
        RpcPattern::AuthRefresh,
        RpcPattern::AuthValidate,
        RpcPattern::UsersFindAll,
        RpcPattern::UsersFindByIds,
        RpcPattern::TasksCreate,
        RpcPattern::TasksFindAll,
        RpcPattern::TasksFindOne,
        RpcPattern::TasksUpdate,
        RpcPattern::TasksDelete,
        RpcPattern::TasksCommentCreate,
        RpcPattern::TasksCommentFindAll,
        RpcPattern::TasksHistory,
        RpcPattern::NotificationsFindAll,
        RpcPattern::NotificationsMarkRead,
        RpcPattern::NotificationsMarkAllRead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RpcPattern::AuthRegister => "auth.register",
            RpcPattern::AuthLogin => "auth.login",
            RpcPattern::AuthRefresh => "auth.refresh",
            RpcPattern::AuthValidate => "auth.validate",
            RpcPattern::UsersFindAll => "users.findAll",
            RpcPattern::UsersFindByIds => "users.findByIds",
            RpcPattern::TasksCreate => "tasks.create",
            RpcPattern::TasksFindAll => "tasks.findAll",
            RpcPattern::TasksFindOne => "tasks.findOne",
            RpcPattern::TasksUpdate => "tasks.update",
            RpcPattern::TasksDelete => "tasks.delete",
            RpcPattern::TasksCommentCreate => "tasks.comment.create",
            RpcPattern::TasksCommentFindAll => "tasks.comment.findAll",
            RpcPattern::TasksHistory => "tasks.history",
            RpcPattern::NotificationsFindAll => "notifications.findAll",
            RpcPattern::NotificationsMarkRead => "notifications.markRead",
            RpcPattern::NotificationsMarkAllRead => "notifications.markAllRead",
        }
    }

    /// Domain whose service answers this pattern.
    pub fn domain(&self) -> Domain {
        match self {
            RpcPattern::AuthRegister
            | RpcPattern::AuthLogin
            | RpcPattern::AuthRefresh
            | RpcPattern::AuthValidate
            | RpcPattern::UsersFindAll
            | RpcPattern::UsersFindByIds => Domain::Identity,
            RpcPattern::TasksCreate
            | RpcPattern::TasksFindAll
            | RpcPattern::TasksFindOne
            | RpcPattern::TasksUpdate
            | RpcPattern::TasksDelete
            | RpcPattern::TasksCommentCreate
            | RpcPattern::TasksCommentFindAll
            | RpcPattern::TasksHistory => Domain::Tasks,
            RpcPattern::NotificationsFindAll
            | RpcPattern::NotificationsMarkRead
            | RpcPattern::NotificationsMarkAllRead => Domain::Notifications,
        }
    }
}

impl fmt::Display for RpcPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RpcPattern {
    type Err = UnknownPattern;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RpcPattern::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPattern(s.to_string()))
    }
}

// ============================================================================
// Domain event patterns
// ============================================================================

// Raised by the tasks service after a mutation commits
pub const TASK_CREATED: &str = "task.created";
pub const TASK_UPDATED: &str = "task.updated";
pub const TASK_DELETED: &str = "task.deleted";
pub const TASK_COMMENT_CREATED: &str = "tasks.comment.created";

// Gateway-facing
pub const GATEWAY_COMMENT_NEW: &str = "comment.new";

/// Internal domain event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub enum EventPattern {
    #[serde(rename = "task.created")]
    TaskCreated,
    #[serde(rename = "task.updated")]
    TaskUpdated,
    #[serde(rename = "task.deleted")]
    TaskDeleted,
    #[serde(rename = "tasks.comment.created")]
    CommentCreated,
}

impl EventPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventPattern::TaskCreated => TASK_CREATED,
            EventPattern::TaskUpdated => TASK_UPDATED,
            EventPattern::TaskDeleted => TASK_DELETED,
            EventPattern::CommentCreated => TASK_COMMENT_CREATED,
        }
    }

    /// The pattern the gateway receives once this event is forwarded.
    pub fn gateway_pattern(&self) -> GatewayPattern {
        match self {
            EventPattern::TaskCreated => GatewayPattern::TaskCreated,
            EventPattern::TaskUpdated => GatewayPattern::TaskUpdated,
            EventPattern::TaskDeleted => GatewayPattern::TaskDeleted,
            EventPattern::CommentCreated => GatewayPattern::CommentNew,
        }
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event kinds pushed to realtime clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub enum GatewayPattern {
    #[serde(rename = "task.created")]
    TaskCreated,
    #[serde(rename = "task.updated")]
    TaskUpdated,
    #[serde(rename = "task.deleted")]
    TaskDeleted,
    #[serde(rename = "comment.new")]
    CommentNew,
}

impl GatewayPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayPattern::TaskCreated => TASK_CREATED,
            GatewayPattern::TaskUpdated => TASK_UPDATED,
            GatewayPattern::TaskDeleted => TASK_DELETED,
            GatewayPattern::CommentNew => GATEWAY_COMMENT_NEW,
        }
    }
}

impl fmt::Display for GatewayPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
