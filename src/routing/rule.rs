//! Routing rule records as stored in the key-value routing store.

use crate::events::Action;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One routing rule, keyed by a pattern string in the store.
///
/// Rules are written by an external administrative process and read-only
/// here. At most one rule exists per exact key string (last write wins on the
/// store side); resolution reads a point-in-time snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// The pattern this rule was stored under: exact address, normalized
    /// address, `*@domain`, or `*`.
    pub pattern: String,
    pub action: Action,
    /// Destination identifier; empty for `reject`.
    #[serde(default)]
    pub target: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl RoutingRule {
    pub fn new(pattern: impl Into<String>, action: Action, target: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            pattern: pattern.into(),
            action,
            target: target.into(),
            enabled: true,
            description: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
