// Error types for the contract fabric

use std::fmt;
use std::time::Duration;

use taskwire_contracts::{FailureKind, RpcFailure};
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for fabric operations
pub type Result<T> = std::result::Result<T, FabricError>;

/// Which half of a contract was violated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Payload,
    Response,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Payload => f.write_str("payload"),
            Direction::Response => f.write_str("response"),
        }
    }
}

/// Errors raised by the fabric
///
/// RPC-path errors are returned to the immediate caller. Forwarding-path
/// errors (`ResolverUnavailable`, `ForwardingFailed`) never reach an RPC
/// caller; the pipeline logs them and reports them as outcomes.
#[derive(Debug, Clone, Error)]
pub enum FabricError {
    /// Payload or response does not satisfy the registered shape
    #[error("contract violation on {pattern} ({direction}): {reason}")]
    ContractViolation {
        pattern: String,
        direction: Direction,
        reason: String,
    },

    /// No contract registered under this pattern
    #[error("unknown pattern: {0}")]
    UnknownPattern(String),

    /// A pattern was registered twice with conflicting bindings (startup only)
    #[error("duplicate registration for {pattern}: {reason}")]
    DuplicatePatternRegistration { pattern: String, reason: String },

    /// Recipient resolution failed
    #[error("recipient resolver unavailable: {0}")]
    ResolverUnavailable(String),

    /// A forwarding event could not be produced or delivered
    #[error("forwarding failed for event {event_id}: {reason}")]
    ForwardingFailed { event_id: Uuid, reason: String },

    /// Transport could not carry the call
    #[error("transport error: {0}")]
    Transport(String),

    /// Caller stopped waiting for a reply
    #[error("{pattern} timed out after {after:?}")]
    Timeout { pattern: String, after: Duration },

    /// The callee answered with a failure
    #[error("{pattern} failed ({kind}): {message}")]
    Remote {
        pattern: String,
        kind: FailureKind,
        message: String,
    },

    /// The event pipeline no longer accepts envelopes
    #[error("event pipeline is closed")]
    PipelineClosed,

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl FabricError {
    /// Create a contract violation error
    pub fn violation(
        pattern: impl Into<String>,
        direction: Direction,
        reason: impl fmt::Display,
    ) -> Self {
        FabricError::ContractViolation {
            pattern: pattern.into(),
            direction,
            reason: reason.to_string(),
        }
    }

    /// Create a duplicate registration error
    pub fn duplicate(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        FabricError::DuplicatePatternRegistration {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Create a resolver error
    pub fn resolver(msg: impl Into<String>) -> Self {
        FabricError::ResolverUnavailable(msg.into())
    }

    /// Create a forwarding error
    pub fn forwarding(event_id: Uuid, reason: impl Into<String>) -> Self {
        FabricError::ForwardingFailed {
            event_id,
            reason: reason.into(),
        }
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        FabricError::Transport(msg.into())
    }

    /// Whether this is a contract violation (including unknown patterns)
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            FabricError::ContractViolation { .. }
                | FabricError::UnknownPattern(_)
                | FabricError::Remote {
                    kind: FailureKind::ContractViolation | FailureKind::UnknownPattern,
                    ..
                }
        )
    }

    /// Wire form of an error raised while dispatching a call
    pub fn to_failure(&self) -> RpcFailure {
        let kind = match self {
            FabricError::ContractViolation { .. } => FailureKind::ContractViolation,
            FabricError::UnknownPattern(_) => FailureKind::UnknownPattern,
            FabricError::Remote { kind, .. } => *kind,
            _ => FailureKind::Internal,
        };
        RpcFailure::new(kind, self.to_string())
    }
}

/// Errors returned by service handlers
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The request is well-formed but cannot be applied
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        HandlerError::NotFound(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        HandlerError::Rejected(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        HandlerError::Internal(msg.into())
    }

    pub fn to_failure(&self) -> RpcFailure {
        match self {
            HandlerError::NotFound(msg) => RpcFailure::new(FailureKind::NotFound, msg.clone()),
            HandlerError::Rejected(msg) => RpcFailure::new(FailureKind::Rejected, msg.clone()),
            HandlerError::Internal(msg) => RpcFailure::new(FailureKind::Internal, msg.clone()),
        }
    }
}

impl From<FabricError> for HandlerError {
    fn from(err: FabricError) -> Self {
        match err {
            FabricError::Remote {
                kind: FailureKind::NotFound,
                message,
                ..
            } => HandlerError::NotFound(message),
            FabricError::Remote {
                kind: FailureKind::Rejected,
                message,
                ..
            } => HandlerError::Rejected(message),
            other => HandlerError::Internal(other.to_string()),
        }
    }
}
