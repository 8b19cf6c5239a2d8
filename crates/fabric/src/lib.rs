// Taskwire contract fabric
//
// Runtime half of the contracts crate:
// - ContractRegistry: per-domain catalog of (pattern, payload, response) shapes
// - RpcDispatcher / RpcClient: typed calls over an untyped Transport
// - EventPipeline: domain events -> recipient-addressed forwarding events
// - GatewayRelay: fans forwarding events out to connected clients

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod relay;
pub mod resolver;
pub mod retry;
pub mod telemetry;

pub use client::{LocalTransport, RpcClient, Transport};
pub use config::FabricConfig;
pub use dispatch::{CallContext, RpcDispatcher, RpcDispatcherBuilder};
pub use error::{Direction, FabricError, HandlerError, Result};
pub use pipeline::{
    Disposition, DropReason, EventPipeline, EventPipelineBuilder, EventPublisher, EventSink,
    ForwardingOutcome, ForwardingState, OrderingKey, PipelineConfig, PipelineHandle,
    PipelineStatsSnapshot,
};
pub use registry::{ContractRegistry, ContractRegistryBuilder};
pub use relay::{ClientMessage, ClientSubscription, DeliveryReport, GatewayRelay};
pub use resolver::{RecipientResolver, StaticResolver};
pub use retry::RetryPolicy;
pub use telemetry::init_tracing;
