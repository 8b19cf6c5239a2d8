// Identity domain contracts
//
// Credential issuance and verification live in the identity service; only
// the request and response shapes are fixed here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::pagination::{Page, PageRequest};
use crate::pattern::RpcPattern;
use crate::rpc::RpcContract;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Tokens handed back after a successful register, login or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AuthRegisterPayload {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AuthLoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AuthRefreshPayload {
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AuthValidatePayload {
    pub access_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct UsersFindAllPayload {
    #[serde(flatten)]
    pub pagination: PageRequest,
    /// Case-insensitive match on username or email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct UsersFindByIdsPayload {
    pub ids: Vec<Uuid>,
}

pub struct AuthRegister;

impl RpcContract for AuthRegister {
    const PATTERN: RpcPattern = RpcPattern::AuthRegister;
    type Payload = AuthRegisterPayload;
    type Response = AuthSession;
}

pub struct AuthLogin;

impl RpcContract for AuthLogin {
    const PATTERN: RpcPattern = RpcPattern::AuthLogin;
    type Payload = AuthLoginPayload;
    type Response = AuthSession;
}

pub struct AuthRefresh;

impl RpcContract for AuthRefresh {
    const PATTERN: RpcPattern = RpcPattern::AuthRefresh;
    type Payload = AuthRefreshPayload;
    type Response = AuthSession;
}

pub struct AuthValidate;

impl RpcContract for AuthValidate {
    const PATTERN: RpcPattern = RpcPattern::AuthValidate;
    type Payload = AuthValidatePayload;
    type Response = User;
}

pub struct UsersFindAll;

impl RpcContract for UsersFindAll {
    const PATTERN: RpcPattern = RpcPattern::UsersFindAll;
    type Payload = UsersFindAllPayload;
    type Response = Page<User>;
}

pub struct UsersFindByIds;

impl RpcContract for UsersFindByIds {
    const PATTERN: RpcPattern = RpcPattern::UsersFindByIds;
    type Payload = UsersFindByIdsPayload;
    type Response = Vec<User>;
}
