// Fabric configuration
//
// Read once at startup from TASKWIRE_* environment variables. Missing values
// use defaults; unparseable values fall back to defaults with a warning.

use std::time::Duration;

use tracing::warn;

use crate::pipeline::PipelineConfig;
use crate::retry::RetryPolicy;

pub const ENV_RESOLVER_MAX_ATTEMPTS: &str = "TASKWIRE_RESOLVER_MAX_ATTEMPTS";
pub const ENV_RESOLVER_INITIAL_BACKOFF_MS: &str = "TASKWIRE_RESOLVER_INITIAL_BACKOFF_MS";
pub const ENV_RESOLVER_MAX_BACKOFF_MS: &str = "TASKWIRE_RESOLVER_MAX_BACKOFF_MS";
pub const ENV_RESOLVER_TIMEOUT_MS: &str = "TASKWIRE_RESOLVER_TIMEOUT_MS";
pub const ENV_SINK_TIMEOUT_MS: &str = "TASKWIRE_SINK_TIMEOUT_MS";
pub const ENV_RPC_TIMEOUT_MS: &str = "TASKWIRE_RPC_TIMEOUT_MS";
pub const ENV_DEFAULT_PAGE_SIZE: &str = "TASKWIRE_DEFAULT_PAGE_SIZE";
pub const ENV_RELAY_DEDUP_CAPACITY: &str = "TASKWIRE_RELAY_DEDUP_CAPACITY";

#[derive(Debug, Clone, PartialEq)]
pub struct FabricConfig {
    pub resolver_max_attempts: u32,
    pub resolver_initial_backoff: Duration,
    pub resolver_max_backoff: Duration,
    /// Bound on one resolver call before it counts as a failed attempt
    pub resolver_timeout: Duration,
    /// Bound on one sink delivery before it counts as a failed attempt
    pub sink_timeout: Duration,
    pub rpc_timeout: Duration,
    /// Page size used when a list request names none
    pub default_page_size: u32,
    pub relay_dedup_capacity: usize,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            resolver_max_attempts: 3,
            resolver_initial_backoff: Duration::from_millis(100),
            resolver_max_backoff: Duration::from_millis(2000),
            resolver_timeout: Duration::from_millis(2000),
            sink_timeout: Duration::from_millis(2000),
            rpc_timeout: Duration::from_millis(5000),
            default_page_size: taskwire_contracts::DEFAULT_PAGE_SIZE,
            relay_dedup_capacity: 1024,
        }
    }
}

impl FabricConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            resolver_max_attempts: positive(
                &lookup,
                ENV_RESOLVER_MAX_ATTEMPTS,
                defaults.resolver_max_attempts,
            ),
            resolver_initial_backoff: millis(
                &lookup,
                ENV_RESOLVER_INITIAL_BACKOFF_MS,
                defaults.resolver_initial_backoff,
            ),
            resolver_max_backoff: millis(
                &lookup,
                ENV_RESOLVER_MAX_BACKOFF_MS,
                defaults.resolver_max_backoff,
            ),
            resolver_timeout: millis(&lookup, ENV_RESOLVER_TIMEOUT_MS, defaults.resolver_timeout),
            sink_timeout: millis(&lookup, ENV_SINK_TIMEOUT_MS, defaults.sink_timeout),
            rpc_timeout: millis(&lookup, ENV_RPC_TIMEOUT_MS, defaults.rpc_timeout),
            default_page_size: positive(&lookup, ENV_DEFAULT_PAGE_SIZE, defaults.default_page_size)
                .min(taskwire_contracts::MAX_PAGE_SIZE),
            relay_dedup_capacity: positive(
                &lookup,
                ENV_RELAY_DEDUP_CAPACITY,
                defaults.relay_dedup_capacity,
            ),
        }
    }

    /// Backoff used around recipient resolution and sink delivery
    pub fn resolver_retry(&self) -> RetryPolicy {
        RetryPolicy::exponential()
            .with_max_attempts(self.resolver_max_attempts)
            .with_initial_interval(self.resolver_initial_backoff)
            .with_max_interval(self.resolver_max_backoff)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_resolver_retry(self.resolver_retry())
            .with_sink_retry(self.resolver_retry())
            .with_resolver_timeout(self.resolver_timeout)
            .with_sink_timeout(self.sink_timeout)
    }
}

fn positive<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default + Copy + std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => value,
        _ => {
            warn!(key, value = %raw, %default, "invalid configuration value, using default");
            default
        }
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    let default_ms = default.as_millis() as u64;
    Duration::from_millis(positive(lookup, key, default_ms))
}
