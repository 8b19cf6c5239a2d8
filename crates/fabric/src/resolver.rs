// Recipient resolution
//
// The pipeline asks a RecipientResolver who should observe each domain event.
// Resolvers belong to whichever service owns membership data; the pipeline
// only sees a set of user ids or an error.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use taskwire_contracts::{ChangeSet, EntitySnapshot};
use uuid::Uuid;

use crate::error::Result;

// ============================================================================
// RecipientResolver Trait
// ============================================================================

/// Computes the audience of a domain event.
///
/// An empty set is a valid answer and means nobody should be told; the
/// pipeline drops the event. Return `FabricError::ResolverUnavailable` when
/// the backing data cannot be read, so the pipeline retries.
#[async_trait]
pub trait RecipientResolver: Send + Sync {
    async fn resolve(
        &self,
        entity: &EntitySnapshot,
        changes: Option<&ChangeSet>,
    ) -> Result<BTreeSet<Uuid>>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str {
        "RecipientResolver"
    }
}

#[async_trait]
impl<R: RecipientResolver + ?Sized> RecipientResolver for Arc<R> {
    async fn resolve(
        &self,
        entity: &EntitySnapshot,
        changes: Option<&ChangeSet>,
    ) -> Result<BTreeSet<Uuid>> {
        (**self).resolve(entity, changes).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

// ============================================================================
// StaticResolver
// ============================================================================

/// Resolves every event to the same fixed audience.
///
/// Useful for broadcast-style deployments and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    recipients: BTreeSet<Uuid>,
}

impl StaticResolver {
    pub fn new(recipients: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            recipients: recipients.into_iter().collect(),
        }
    }

    /// Resolver that never finds anyone
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecipientResolver for StaticResolver {
    async fn resolve(
        &self,
        _entity: &EntitySnapshot,
        _changes: Option<&ChangeSet>,
    ) -> Result<BTreeSet<Uuid>> {
        Ok(self.recipients.clone())
    }

    fn name(&self) -> &'static str {
        "StaticResolver"
    }
}
