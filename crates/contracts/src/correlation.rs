// Correlation context
//
// One context is minted per externally-triggered operation and copied, never
// mutated, into every call and event caused by it. Following `parent_id`
// links reconstructs a chain of asynchronous hops.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Returned when an empty string is offered as a correlation id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("correlation id must not be empty")]
pub struct EmptyCorrelationId;

/// Opaque, non-empty correlation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(try_from = "String", into = "String")]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mint a fresh id from 128 random bits.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(value: impl Into<String>) -> Result<Self, EmptyCorrelationId> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(EmptyCorrelationId);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CorrelationId {
    type Error = EmptyCorrelationId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CorrelationId> for String {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a sub-call issued by an intermediate service is correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubCallPolicy {
    /// The sub-call shares the trigger's id.
    Reuse,
    /// The sub-call result must be told apart from its parent's: fresh id,
    /// `parent_id` pointing at the trigger.
    Distinct,
}

/// Correlation metadata attached to every call, reply and event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CorrelationContext {
    pub id: CorrelationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CorrelationId>,
}

impl CorrelationContext {
    /// Root context for a new client request.
    pub fn new() -> Self {
        Self {
            id: CorrelationId::generate(),
            parent_id: None,
        }
    }

    /// Adopt an id supplied by an upstream caller (e.g. a request header).
    pub fn from_id(id: CorrelationId) -> Self {
        Self {
            id,
            parent_id: None,
        }
    }

    /// Copy for a call or event caused by the same operation.
    pub fn forward(&self) -> Self {
        self.clone()
    }

    /// Child context with a freshly minted id.
    pub fn fork(&self) -> Self {
        Self {
            id: CorrelationId::generate(),
            parent_id: Some(self.id.clone()),
        }
    }

    pub fn for_sub_call(&self, policy: SubCallPolicy) -> Self {
        match policy {
            SubCallPolicy::Reuse => self.forward(),
            SubCallPolicy::Distinct => self.fork(),
        }
    }

    /// True when `self` carries the trigger's id or names it as parent.
    pub fn is_caused_by(&self, trigger: &CorrelationContext) -> bool {
        self.id == trigger.id || self.parent_id.as_ref() == Some(&trigger.id)
    }

    /// Walk `parent_id` links from `self` through `known` contexts.
    ///
    /// Returns the ids from `self` back to the oldest ancestor that can be
    /// found. A parent id with no matching context still terminates the chain.
    pub fn lineage<'a>(&'a self, known: &'a [CorrelationContext]) -> Vec<&'a CorrelationId> {
        let mut chain = vec![&self.id];
        let mut next = self.parent_id.as_ref();
        while let Some(parent) = next {
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            next = known
                .iter()
                .find(|ctx| &ctx.id == parent && ctx.parent_id.is_some())
                .and_then(|ctx| ctx.parent_id.as_ref());
        }
        chain
    }
}

impl Default for CorrelationContext {
    fn default() -> Self {
        Self::new()
    }
}
