//! RPC dispatcher
//!
//! The receiving side of the transport. Each service builds one dispatcher
//! against its registry and registers one typed handler per pattern it
//! serves. Untyped JSON coming off the wire is checked against the contract
//! here and nowhere else.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use taskwire_contracts::{
    ContractEntry, CorrelationContext, RpcCall, RpcContract, RpcFailure, RpcPattern, RpcReply,
};
use tracing::{debug, info_span, warn, Instrument};

use crate::error::{Direction, FabricError, HandlerError, Result};
use crate::registry::ContractRegistry;

/// What a handler knows about the call it is serving
#[derive(Debug, Clone)]
pub struct CallContext {
    pub pattern: RpcPattern,
    /// Correlation of the incoming call; copy it into every call and event
    /// this handler causes
    pub correlation: CorrelationContext,
}

type ErasedHandler =
    Arc<dyn Fn(CallContext, Value) -> BoxFuture<'static, std::result::Result<Value, RpcFailure>> + Send + Sync>;

/// Routes incoming calls to typed handlers
pub struct RpcDispatcher {
    registry: Arc<ContractRegistry>,
    handlers: HashMap<RpcPattern, ErasedHandler>,
}

impl RpcDispatcher {
    pub fn builder(registry: Arc<ContractRegistry>) -> RpcDispatcherBuilder {
        RpcDispatcherBuilder {
            registry,
            handlers: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ContractRegistry> {
        &self.registry
    }

    pub fn handles(&self, pattern: RpcPattern) -> bool {
        self.handlers.contains_key(&pattern)
    }

    /// Registered patterns that have no handler yet
    pub fn unhandled_patterns(&self) -> Vec<RpcPattern> {
        let mut missing: Vec<_> = self
            .registry
            .patterns()
            .filter(|p| !self.handlers.contains_key(p))
            .collect();
        missing.sort();
        missing
    }

    /// Validate and serve one call
    ///
    /// Never fails: every problem is turned into a failure reply that echoes
    /// the call's pattern and correlation.
    pub async fn dispatch(&self, mut call: RpcCall) -> RpcReply {
        let span = info_span!(
            "rpc.dispatch",
            pattern = %call.pattern,
            correlation_id = %call.correlation.id,
        );

        async move {
            let entry = match self.registry.lookup(&call.pattern) {
                Ok(entry) => *entry,
                Err(err) => {
                    warn!(error = %err, "rejecting call");
                    return RpcReply::error(&call, err.to_failure());
                }
            };

            let Some(handler) = self.handlers.get(&entry.pattern) else {
                let err = FabricError::UnknownPattern(call.pattern.clone());
                warn!("no handler registered");
                return RpcReply::error(&call, err.to_failure());
            };

            let ctx = CallContext {
                pattern: entry.pattern,
                correlation: call.correlation.clone(),
            };
            let payload = std::mem::take(&mut call.payload);

            match handler(ctx, payload).await {
                Ok(response) => {
                    debug!("call served");
                    RpcReply::ok(&call, response)
                }
                Err(failure) => {
                    debug!(kind = %failure.kind, message = %failure.message, "call failed");
                    RpcReply::error(&call, failure)
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Collects typed handlers, checking each against the registry
pub struct RpcDispatcherBuilder {
    registry: Arc<ContractRegistry>,
    handlers: HashMap<RpcPattern, ErasedHandler>,
}

impl RpcDispatcherBuilder {
    /// Register the handler for contract `C`
    ///
    /// Fails if the registry has no entry for `C::PATTERN`, if the entry's
    /// shape differs from `C`, or if a handler is already registered.
    pub fn handle<C, F, Fut>(mut self, handler: F) -> Result<Self>
    where
        C: RpcContract,
        F: Fn(CallContext, C::Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<C::Response, HandlerError>> + Send + 'static,
    {
        let pattern = C::PATTERN;
        let registered = self
            .registry
            .get(pattern)
            .ok_or_else(|| FabricError::UnknownPattern(pattern.as_str().to_string()))?;

        let offered = ContractEntry::of::<C>();
        if !registered.same_shape(&offered) {
            return Err(FabricError::duplicate(
                pattern.as_str(),
                format!(
                    "handler bound to {} -> {}, registry holds {} -> {}",
                    offered.payload, offered.response, registered.payload, registered.response
                ),
            ));
        }

        if self.handlers.contains_key(&pattern) {
            return Err(FabricError::duplicate(
                pattern.as_str(),
                "handler already registered",
            ));
        }

        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |ctx: CallContext, payload: Value| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let payload: C::Payload = serde_json::from_value(payload).map_err(|e| {
                    FabricError::violation(C::PATTERN.as_str(), Direction::Payload, e).to_failure()
                })?;

                let response = handler(ctx, payload).await.map_err(|e| e.to_failure())?;

                serde_json::to_value(&response).map_err(|e| {
                    FabricError::violation(C::PATTERN.as_str(), Direction::Response, e).to_failure()
                })
            })
        });

        self.handlers.insert(pattern, erased);
        Ok(self)
    }

    pub fn build(self) -> RpcDispatcher {
        RpcDispatcher {
            registry: self.registry,
            handlers: self.handlers,
        }
    }
}
