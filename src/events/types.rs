//! Routing decision types shared between the resolver and the dispatch fan-out.

use super::inbound::Verdicts;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Downstream action selected for one recipient.
///
/// Closed set: deserializing an unknown action string is an error, so a rule
/// store entry with a bad action surfaces at the boundary instead of routing
/// mail nowhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Hand the message to a delivery handler for the decision's target.
    Deliver,
    /// Send a bounce back to the sender; no target.
    Reject,
    /// Record the message for canary/health monitoring.
    Monitor,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Deliver, Action::Reject, Action::Monitor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deliver => "deliver",
            Self::Reject => "reject",
            Self::Monitor => "monitor",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deliver" => Ok(Self::Deliver),
            "reject" => Ok(Self::Reject),
            "monitor" => Ok(Self::Monitor),
            _ => Err(format!("Unknown routing action: {s}")),
        }
    }
}

/// Which lookup form produced a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Raw recipient address matched a rule verbatim.
    Exact,
    /// Plus-tag-stripped address matched.
    Normalized,
    /// `*@domain` wildcard matched.
    DomainWildcard,
    /// `*` global wildcard matched.
    GlobalWildcard,
    /// No enabled rule matched; the deterministic default applied.
    Default,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exact => "exact",
            Self::Normalized => "normalized",
            Self::DomainWildcard => "domain_wildcard",
            Self::GlobalWildcard => "global_wildcard",
            Self::Default => "default",
        };
        f.write_str(s)
    }
}

/// The resolved action/target pair for one recipient of one inbound event.
///
/// Ephemeral: exists only for the duration of one resolution/dispatch cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub recipient: String,
    pub matched_key: MatchKind,
    pub action: Action,
    /// Destination identifier; empty for `reject`.
    #[serde(default)]
    pub target: String,
    pub source_message_id: String,
    pub verdicts: Verdicts,
    pub correlation_id: Uuid,
}

impl RoutingDecision {
    /// The deterministic decision applied when no enabled rule matches.
    /// Unmatched recipients must never silently vanish.
    pub fn default_reject(
        recipient: impl Into<String>,
        source_message_id: impl Into<String>,
        verdicts: Verdicts,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            matched_key: MatchKind::Default,
            action: Action::Reject,
            target: String::new(),
            source_message_id: source_message_id.into(),
            verdicts,
            correlation_id,
        }
    }
}
