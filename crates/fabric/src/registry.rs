//! Contract registry
//!
//! An explicit, constructed catalog of (pattern, payload shape, response
//! shape) entries. Built once at startup, then shared behind an `Arc` and
//! read concurrently without locking.

use std::collections::HashMap;
use std::fmt;

use taskwire_contracts::{catalog, ContractEntry, Domain, RpcContract, RpcPattern, Shape};
use tracing::debug;

use crate::error::{FabricError, Result};

/// Read-only map from pattern to its registered contract entry
#[derive(Clone, Default)]
pub struct ContractRegistry {
    entries: HashMap<RpcPattern, ContractEntry>,
}

impl ContractRegistry {
    pub fn builder() -> ContractRegistryBuilder {
        ContractRegistryBuilder::new()
    }

    /// Registry holding every contract of one domain.
    pub fn for_domain(domain: Domain) -> Result<Self> {
        Ok(Self::builder().domain(domain)?.build())
    }

    /// Look up an entry by pattern
    pub fn get(&self, pattern: RpcPattern) -> Option<&ContractEntry> {
        self.entries.get(&pattern)
    }

    /// Parse a raw wire pattern and look up its entry
    pub fn lookup(&self, raw: &str) -> Result<&ContractEntry> {
        let pattern: RpcPattern = raw
            .parse()
            .map_err(|_| FabricError::UnknownPattern(raw.to_string()))?;
        self.get(pattern)
            .ok_or_else(|| FabricError::UnknownPattern(raw.to_string()))
    }

    pub fn payload_shape_of(&self, pattern: RpcPattern) -> Option<Shape> {
        self.get(pattern).map(|e| e.payload)
    }

    pub fn response_shape_of(&self, pattern: RpcPattern) -> Option<Shape> {
        self.get(pattern).map(|e| e.response)
    }

    pub fn contains(&self, pattern: RpcPattern) -> bool {
        self.entries.contains_key(&pattern)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = RpcPattern> + '_ {
        self.entries.keys().copied()
    }
}

impl fmt::Debug for ContractRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut patterns: Vec<_> = self.entries.keys().map(|p| p.as_str()).collect();
        patterns.sort_unstable();
        f.debug_struct("ContractRegistry")
            .field("patterns", &patterns)
            .finish()
    }
}

/// Builder that enforces one shape per pattern
#[derive(Default)]
pub struct ContractRegistryBuilder {
    registry: ContractRegistry,
}

impl ContractRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the binding declared by `C`
    pub fn register<C: RpcContract>(self) -> Result<Self> {
        self.entry(ContractEntry::of::<C>())
    }

    /// Register a single entry
    ///
    /// Re-registering an identical entry is a no-op. A different shape under
    /// an existing pattern fails with `DuplicatePatternRegistration`.
    pub fn entry(mut self, entry: ContractEntry) -> Result<Self> {
        if let Some(existing) = self.registry.entries.get(&entry.pattern) {
            if existing.same_shape(&entry) {
                return Ok(self);
            }
            return Err(FabricError::duplicate(
                entry.pattern.as_str(),
                format!(
                    "registered as {} -> {}, attempted {} -> {}",
                    existing.payload, existing.response, entry.payload, entry.response
                ),
            ));
        }

        debug!(pattern = %entry.pattern, payload = %entry.payload, "registered contract");
        self.registry.entries.insert(entry.pattern, entry);
        Ok(self)
    }

    /// Register every catalog entry of a domain
    pub fn domain(self, domain: Domain) -> Result<Self> {
        catalog(domain)
            .into_iter()
            .try_fold(self, |builder, entry| builder.entry(entry))
    }

    pub fn build(self) -> ContractRegistry {
        self.registry
    }
}
