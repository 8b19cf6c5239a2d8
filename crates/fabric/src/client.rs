//! Calling side of the RPC path
//!
//! `RpcClient` turns a typed call into an `RpcCall` frame, hands it to a
//! `Transport`, and checks the reply before decoding it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use taskwire_contracts::{
    CorrelationContext, Domain, FailureKind, RpcCall, RpcContract, RpcOutcome, RpcPattern,
    RpcReply,
};
use tracing::{debug, warn};

use crate::dispatch::RpcDispatcher;
use crate::error::{Direction, FabricError, Result};

/// Carries call frames to the service that owns the pattern
///
/// Implementations must deliver the pattern string and correlation context
/// unaltered.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, call: RpcCall) -> Result<RpcReply>;
}

/// In-process transport routing calls by domain
///
/// Each dispatch runs on its own task, so a caller that stops waiting does
/// not cancel work the callee has already started.
#[derive(Default, Clone)]
pub struct LocalTransport {
    routes: HashMap<Domain, Arc<RpcDispatcher>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every pattern of `domain` to `dispatcher`
    pub fn with_service(mut self, domain: Domain, dispatcher: Arc<RpcDispatcher>) -> Self {
        self.routes.insert(domain, dispatcher);
        self
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send(&self, call: RpcCall) -> Result<RpcReply> {
        let pattern: RpcPattern = call
            .pattern
            .parse()
            .map_err(|_| FabricError::UnknownPattern(call.pattern.clone()))?;

        let dispatcher = self
            .routes
            .get(&pattern.domain())
            .cloned()
            .ok_or_else(|| {
                FabricError::transport(format!("no service bound for domain {}", pattern.domain()))
            })?;

        tokio::spawn(async move { dispatcher.dispatch(call).await })
            .await
            .map_err(|e| FabricError::transport(format!("dispatch task failed: {e}")))
    }
}

/// Typed RPC client
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            timeout: Duration::from_secs(5),
        }
    }

    /// Default bound used by `call_with_default_timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Call `C::PATTERN` carrying `ctx`
    pub async fn call<C: RpcContract>(
        &self,
        ctx: &CorrelationContext,
        payload: &C::Payload,
    ) -> Result<C::Response> {
        let pattern = C::PATTERN.as_str();
        let encoded = serde_json::to_value(payload)
            .map_err(|e| FabricError::violation(pattern, Direction::Payload, e))?;

        let call = RpcCall::new(C::PATTERN, ctx.clone(), encoded);
        debug!(pattern, correlation_id = %ctx.id, "sending call");

        let reply = self.transport.send(call).await?;

        if reply.correlation.id != ctx.id {
            warn!(
                pattern,
                expected = %ctx.id,
                received = %reply.correlation.id,
                "reply correlation mismatch"
            );
            return Err(FabricError::transport(format!(
                "reply to {pattern} carried correlation {} instead of {}",
                reply.correlation.id, ctx.id
            )));
        }
        if reply.pattern != pattern {
            return Err(FabricError::transport(format!(
                "reply to {pattern} carried pattern {}",
                reply.pattern
            )));
        }

        match reply.outcome {
            RpcOutcome::Ok { response } => serde_json::from_value(response)
                .map_err(|e| FabricError::violation(pattern, Direction::Response, e)),
            RpcOutcome::Error { error } => Err(match error.kind {
                FailureKind::UnknownPattern => FabricError::UnknownPattern(pattern.to_string()),
                kind => FabricError::Remote {
                    pattern: pattern.to_string(),
                    kind,
                    message: error.message,
                },
            }),
        }
    }

    /// `call`, giving up after `after`
    ///
    /// Only the wait is abandoned; the callee keeps running and its events
    /// are still raised.
    pub async fn call_with_timeout<C: RpcContract>(
        &self,
        ctx: &CorrelationContext,
        payload: &C::Payload,
        after: Duration,
    ) -> Result<C::Response> {
        tokio::time::timeout(after, self.call::<C>(ctx, payload))
            .await
            .map_err(|_| FabricError::Timeout {
                pattern: C::PATTERN.as_str().to_string(),
                after,
            })?
    }

    pub async fn call_with_default_timeout<C: RpcContract>(
        &self,
        ctx: &CorrelationContext,
        payload: &C::Payload,
    ) -> Result<C::Response> {
        self.call_with_timeout::<C>(ctx, payload, self.timeout).await
    }
}
