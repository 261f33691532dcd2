//! Key-value routing store access.
//!
//! The store is an external partition/sort-key service; the core only ever
//! performs single point reads against it. Lookup failures are transient
//! infrastructure errors that propagate to the caller - the resolver performs
//! no retries of its own.

use super::rule::RoutingRule;
use crate::constants::store::{ROUTE_KEY_PREFIX, RULE_SORT_KEY};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Partition key for one routing rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteKey(String);

impl RouteKey {
    /// Build the partition key for a pattern string.
    pub fn for_pattern(pattern: &str) -> Self {
        Self(format!("{ROUTE_KEY_PREFIX}{pattern}"))
    }

    /// The full partition key, prefix included.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The pattern portion without the partition prefix.
    pub fn pattern(&self) -> &str {
        self.0.strip_prefix(ROUTE_KEY_PREFIX).unwrap_or(&self.0)
    }

    /// Sort key shared by all current rule records.
    pub fn sort_key() -> &'static str {
        RULE_SORT_KEY
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors from the routing store substrate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Routing store unavailable: {0}")]
    Unavailable(String),
    #[error("Routing store read failed for {key}: {reason}")]
    ReadFailed { key: String, reason: String },
    #[error("Malformed rule record under {key}: {reason}")]
    MalformedRecord { key: String, reason: String },
}

/// Read-only point lookup against the routing store.
#[async_trait]
pub trait RouteStore: Send + Sync {
    /// Fetch the rule stored under `key`, if any. One point read, no range
    /// scan.
    async fn get(&self, key: &RouteKey) -> Result<Option<RoutingRule>, StoreError>;
}

/// In-memory routing store used in tests and as a local substrate stand-in.
///
/// Writes exist only so tests and fixtures can seed rules; the core never
/// mutates the store.
#[derive(Debug, Clone, Default)]
pub struct MemoryRouteStore {
    rules: Arc<RwLock<HashMap<RouteKey, RoutingRule>>>,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a rule under its pattern key. Last write wins, matching the
    /// external store's single-record-per-key invariant.
    pub fn put(&self, rule: RoutingRule) {
        let key = RouteKey::for_pattern(&rule.pattern);
        self.rules.write().insert(key, rule);
    }

    pub fn remove(&self, pattern: &str) -> Option<RoutingRule> {
        self.rules.write().remove(&RouteKey::for_pattern(pattern))
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

#[async_trait]
impl RouteStore for MemoryRouteStore {
    async fn get(&self, key: &RouteKey) -> Result<Option<RoutingRule>, StoreError> {
        Ok(self.rules.read().get(key).cloned())
    }
}

/// Store wrapper that fails every read; test helper for the transient-error
/// propagation path.
#[cfg(test)]
pub struct FailingRouteStore;

#[cfg(test)]
#[async_trait]
impl RouteStore for FailingRouteStore {
    async fn get(&self, key: &RouteKey) -> Result<Option<RoutingRule>, StoreError> {
        Err(StoreError::ReadFailed {
            key: key.to_string(),
            reason: "simulated outage".into(),
        })
    }
}
