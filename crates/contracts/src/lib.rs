// Public contracts for Taskwire services
//
// This crate defines the wire shapes every service compiles against:
// - pattern strings per domain (identity, tasks, notifications, gateway)
// - RpcContract bindings tying each pattern to one payload and one response type
// - RPC call/reply frames
// - the correlation context threaded through calls and events
// - domain event envelopes and gateway forwarding events
// - the shared pagination envelope

pub mod catalog;
pub mod correlation;
pub mod events;
pub mod identity;
pub mod notifications;
pub mod pagination;
pub mod pattern;
pub mod rpc;
pub mod tasks;

pub use catalog::{catalog, full_catalog};
pub use correlation::{CorrelationContext, CorrelationId, EmptyCorrelationId, SubCallPolicy};
pub use events::{
    ChangeSet, DomainEventEnvelope, EntitySnapshot, FieldChange, ForwardedPayload,
    ForwardingEvent, NoRecipients, Recipients,
};
pub use identity::*;
pub use notifications::*;
pub use pagination::{Page, PageRequest, PageWindow, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use pattern::{Domain, EventPattern, GatewayPattern, RpcPattern, UnknownPattern};
pub use rpc::{
    ContractEntry, FailureKind, RpcCall, RpcContract, RpcFailure, RpcOutcome, RpcReply, Shape,
};
pub use tasks::*;
