// RPC contracts and wire frames
//
// A contract binds one pattern to one payload type and one response type at
// compile time. The frames below are what actually crosses a transport: the
// payload and response travel as untyped JSON and are checked against the
// contract at the receiving end.

use std::any::type_name;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationContext;
use crate::pattern::RpcPattern;

// ============================================================================
// Contract binding
// ============================================================================

/// Compile-time binding of a pattern to its payload and response shapes.
///
/// Implemented by zero-sized marker types, one per operation:
///
/// ```
/// use taskwire_contracts::{RpcContract, RpcPattern, TasksCreate};
///
/// assert_eq!(TasksCreate::PATTERN, RpcPattern::TasksCreate);
/// ```
pub trait RpcContract: Send + Sync + 'static {
    const PATTERN: RpcPattern;
    type Payload: Serialize + DeserializeOwned + Send + Sync + 'static;
    type Response: Serialize + DeserializeOwned + Send + Sync + 'static;
}

/// Name of a payload or response type, used to compare registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape(&'static str);

impl Shape {
    pub fn of<T: ?Sized>() -> Self {
        Shape(type_name::<T>())
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// One row of the contract catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractEntry {
    pub pattern: RpcPattern,
    pub payload: Shape,
    pub response: Shape,
}

impl ContractEntry {
    pub fn of<C: RpcContract>() -> Self {
        Self {
            pattern: C::PATTERN,
            payload: Shape::of::<C::Payload>(),
            response: Shape::of::<C::Response>(),
        }
    }

    /// Same pattern bound to the same payload and response types.
    pub fn same_shape(&self, other: &ContractEntry) -> bool {
        self.payload == other.payload && self.response == other.response
    }
}

// ============================================================================
// Wire frames
// ============================================================================

/// An RPC request as it travels between services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcCall {
    /// Pattern string, kept raw so unknown patterns can be reported.
    pub pattern: String,
    pub correlation: CorrelationContext,
    pub payload: serde_json::Value,
}

impl RpcCall {
    pub fn new(
        pattern: RpcPattern,
        correlation: CorrelationContext,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            pattern: pattern.as_str().to_string(),
            correlation,
            payload,
        }
    }
}

/// Reply to an [`RpcCall`]. Echoes the call's pattern and correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReply {
    pub pattern: String,
    pub correlation: CorrelationContext,
    pub outcome: RpcOutcome,
}

impl RpcReply {
    pub fn ok(call: &RpcCall, response: serde_json::Value) -> Self {
        Self {
            pattern: call.pattern.clone(),
            correlation: call.correlation.clone(),
            outcome: RpcOutcome::Ok { response },
        }
    }

    pub fn error(call: &RpcCall, error: RpcFailure) -> Self {
        Self {
            pattern: call.pattern.clone(),
            correlation: call.correlation.clone(),
            outcome: RpcOutcome::Error { error },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, RpcOutcome::Ok { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RpcOutcome {
    Ok { response: serde_json::Value },
    Error { error: RpcFailure },
}

/// Failure classes that may cross the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Payload or response did not satisfy the registered shape
    ContractViolation,
    /// No contract is registered under the pattern
    UnknownPattern,
    NotFound,
    /// The service refused the request (bad state, invalid values)
    Rejected,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ContractViolation => "contract_violation",
            FailureKind::UnknownPattern => "unknown_pattern",
            FailureKind::NotFound => "not_found",
            FailureKind::Rejected => "rejected",
            FailureKind::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RpcFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
