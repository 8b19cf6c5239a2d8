// Notification domain contracts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::pagination::{Page, PageRequest};
use crate::pattern::{GatewayPattern, RpcPattern};
use crate::rpc::RpcContract;

/// A stored notification for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Gateway event that produced the notification
    pub kind: GatewayPattern,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct NotificationsFindAllPayload {
    pub user_id: Uuid,
    #[serde(default)]
    pub unread_only: bool,
    #[serde(flatten)]
    pub pagination: PageRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct NotificationsMarkReadPayload {
    pub id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct NotificationsMarkAllReadPayload {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct MarkAllReadResult {
    pub updated: u64,
}

pub struct NotificationsFindAll;

impl RpcContract for NotificationsFindAll {
    const PATTERN: RpcPattern = RpcPattern::NotificationsFindAll;
    type Payload = NotificationsFindAllPayload;
    type Response = Page<Notification>;
}

pub struct NotificationsMarkRead;

impl RpcContract for NotificationsMarkRead {
    const PATTERN: RpcPattern = RpcPattern::NotificationsMarkRead;
    type Payload = NotificationsMarkReadPayload;
    type Response = Notification;
}

pub struct NotificationsMarkAllRead;

impl RpcContract for NotificationsMarkAllRead {
    const PATTERN: RpcPattern = RpcPattern::NotificationsMarkAllRead;
    type Payload = NotificationsMarkAllReadPayload;
    type Response = MarkAllReadResult;
}
