//! # Configuration System
//!
//! Typed configuration for every pipeline component, loaded from defaults, an
//! optional TOML file, and `MAILROUTE_`-prefixed environment overrides.
//! Validation is explicit: a bad value fails loading instead of silently
//! falling back.

pub mod loader;

use crate::retry::{BackoffPolicy, RetryOrchestratorConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use loader::ConfigManager;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MailRouteConfig {
    /// Routing resolution settings.
    pub resolver: ResolverConfig,

    /// Event-bus dispatch settings.
    pub dispatch: DispatchConfig,

    /// Counter publication settings.
    pub metrics: MetricsConfig,

    /// Retry orchestrator settings.
    pub retry: RetryConfig,

    /// Credential expiration monitor settings.
    pub monitor: MonitorConfig,
}

/// Routing resolution configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Wall-clock budget for one event's resolution, all lookups included.
    pub resolve_budget_seconds: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            resolve_budget_seconds: 30,
        }
    }
}

impl ResolverConfig {
    pub fn resolve_budget(&self) -> Duration {
        Duration::from_secs(self.resolve_budget_seconds)
    }
}

/// Event-bus dispatch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Broadcast channel capacity for the in-process bus.
    pub bus_capacity: usize,
    /// Delivery attempts per subscriber before dead-lettering.
    pub max_delivery_attempts: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            bus_capacity: 1000,
            max_delivery_attempts: 3,
        }
    }
}

/// Counter publication configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Namespace prefix for every emitted counter; the deployment environment
    /// is appended.
    pub namespace: String,
    pub environment: String,
    /// Time-to-live for idempotency-store entries; must outlast the
    /// substrate's redelivery window.
    pub idempotency_ttl_seconds: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "MailRoute".to_string(),
            environment: "development".to_string(),
            idempotency_ttl_seconds: 900,
        }
    }
}

impl MetricsConfig {
    /// Full namespace string, e.g. `MailRoute/production`.
    pub fn qualified_namespace(&self) -> String {
        format!("{}/{}", self.namespace, self.environment)
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_seconds)
    }
}

/// Retry orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Messages requested per receive.
    pub batch_size: usize,
    /// Long-poll window per receive, in milliseconds.
    pub receive_wait_ms: u64,
    /// Substrate visibility timeout for leased messages, in seconds.
    pub visibility_timeout_seconds: u64,
    /// Hard wall-clock timeout for one handler re-invocation, in milliseconds.
    pub invoke_timeout_ms: u64,
    /// Invocation-layer backoff for infrastructure errors.
    pub backoff: BackoffPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::constants::limits::MAX_RECEIVE_BATCH,
            receive_wait_ms: 5_000,
            visibility_timeout_seconds: 120,
            invoke_timeout_ms: 60_000,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }

    /// Project into the orchestrator's own config type.
    pub fn orchestrator_config(&self) -> RetryOrchestratorConfig {
        RetryOrchestratorConfig {
            batch_size: self.batch_size,
            receive_wait_ms: self.receive_wait_ms,
            invoke_timeout_ms: self.invoke_timeout_ms,
            backoff: self.backoff.clone(),
        }
    }
}

/// Expiration monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Wall-clock budget for one monitor run.
    pub run_timeout_seconds: u64,
    /// Scheduled interval between runs; enforced by the external scheduler,
    /// recorded here for operator visibility.
    pub run_interval_seconds: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            run_timeout_seconds: 10,
            run_interval_seconds: 300,
        }
    }
}

impl MonitorConfig {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_seconds)
    }
}

impl MailRouteConfig {
    /// Validate operational bounds; called by the loader after merging.
    pub fn validate(&self) -> Result<(), String> {
        if self.resolver.resolve_budget_seconds == 0 {
            return Err("resolver.resolve_budget_seconds must be positive".into());
        }
        if self.dispatch.bus_capacity == 0 {
            return Err("dispatch.bus_capacity must be positive".into());
        }
        if self.dispatch.max_delivery_attempts == 0 {
            return Err("dispatch.max_delivery_attempts must be positive".into());
        }
        if self.metrics.namespace.is_empty() {
            return Err("metrics.namespace must not be empty".into());
        }
        if self.retry.batch_size == 0 {
            return Err("retry.batch_size must be positive".into());
        }
        if self.retry.batch_size > crate::constants::limits::MAX_RECEIVE_BATCH {
            return Err(format!(
                "retry.batch_size exceeds the substrate receive limit of {}",
                crate::constants::limits::MAX_RECEIVE_BATCH
            ));
        }
        if self.retry.backoff.max_attempts == 0 {
            return Err("retry.backoff.max_attempts must be positive".into());
        }
        if self.retry.backoff.base_delay_ms > self.retry.backoff.max_delay_ms {
            return Err("retry.backoff.base_delay_ms exceeds max_delay_ms".into());
        }
        if self.monitor.run_timeout_seconds == 0 {
            return Err("monitor.run_timeout_seconds must be positive".into());
        }
        Ok(())
    }
}
