//! Inbound message-processing events as delivered by the receiving substrate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Outcome of one security check on an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictStatus {
    Pass,
    Fail,
    Gray,
    ProcessingFailed,
}

impl VerdictStatus {
    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail)
    }
}

/// Security verdicts carried on an inbound event.
///
/// The receiving substrate evaluates these before the event reaches the
/// resolver; the core only reads them. DMARC is special-cased because its
/// verdict is only disqualifying when the sender domain's published policy
/// says to reject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdicts {
    #[serde(default)]
    pub checks: HashMap<String, VerdictStatus>,
    /// Sender-domain DMARC policy, present only when a DMARC verdict exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dmarc_policy: Option<String>,
}

impl Verdicts {
    const DISQUALIFYING: [&'static str; 4] = ["spam", "virus", "dkim", "spf"];

    /// Whether the message should be rejected outright, before any routing
    /// lookup: any hard check failed, or DMARC failed under a reject policy.
    pub fn requires_reject(&self) -> bool {
        for check in Self::DISQUALIFYING {
            if self.checks.get(check).is_some_and(VerdictStatus::is_fail) {
                return true;
            }
        }
        self.checks.get("dmarc").is_some_and(VerdictStatus::is_fail)
            && self.dmarc_policy.as_deref() == Some("reject")
    }

    pub fn with_check(mut self, name: impl Into<String>, status: VerdictStatus) -> Self {
        self.checks.insert(name.into(), status);
        self
    }

    pub fn with_dmarc_policy(mut self, policy: impl Into<String>) -> Self {
        self.dmarc_policy = Some(policy.into());
        self
    }

    /// All-pass verdicts for the standard check set.
    pub fn all_pass() -> Self {
        let mut verdicts = Self::default();
        for check in Self::DISQUALIFYING {
            verdicts.checks.insert(check.to_string(), VerdictStatus::Pass);
        }
        verdicts
    }
}

/// One inbound message-processing event, fanned out by the resolver into one
/// routing decision per recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Unique message identifier assigned by the receiving substrate.
    pub message_id: String,
    /// Envelope recipients; at least one.
    pub recipients: Vec<String>,
    /// Envelope sender.
    pub source: String,
    /// Security verdicts from the receiving substrate.
    #[serde(default)]
    pub verdicts: Verdicts,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
    /// Distributed-tracing identifier; generated here if the substrate did not
    /// supply one.
    #[serde(default = "Uuid::new_v4")]
    pub correlation_id: Uuid,
}

impl InboundEvent {
    pub fn new(message_id: impl Into<String>, source: impl Into<String>, recipients: Vec<String>) -> Self {
        Self {
            message_id: message_id.into(),
            recipients,
            source: source.into(),
            verdicts: Verdicts::all_pass(),
            received_at: Utc::now(),
            correlation_id: Uuid::new_v4(),
        }
    }

    pub fn with_verdicts(mut self, verdicts: Verdicts) -> Self {
        self.verdicts = verdicts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_pass_does_not_require_reject() {
        assert!(!Verdicts::all_pass().requires_reject());
    }

    #[test]
    fn test_hard_check_failure_requires_reject() {
        for check in ["spam", "virus", "dkim", "spf"] {
            let verdicts = Verdicts::all_pass().with_check(check, VerdictStatus::Fail);
            assert!(verdicts.requires_reject(), "{check} FAIL should reject");
        }
    }

    #[test]
    fn test_dmarc_failure_rejects_only_under_reject_policy() {
        let fail_no_policy = Verdicts::all_pass().with_check("dmarc", VerdictStatus::Fail);
        assert!(!fail_no_policy.requires_reject());

        let fail_none_policy = Verdicts::all_pass()
            .with_check("dmarc", VerdictStatus::Fail)
            .with_dmarc_policy("none");
        assert!(!fail_none_policy.requires_reject());

        let fail_reject_policy = Verdicts::all_pass()
            .with_check("dmarc", VerdictStatus::Fail)
            .with_dmarc_policy("reject");
        assert!(fail_reject_policy.requires_reject());
    }

    #[test]
    fn test_gray_verdict_is_not_disqualifying() {
        let verdicts = Verdicts::all_pass().with_check("spam", VerdictStatus::Gray);
        assert!(!verdicts.requires_reject());
    }

    #[test]
    fn test_verdict_status_wire_format() {
        let json = serde_json::to_string(&VerdictStatus::ProcessingFailed).unwrap();
        assert_eq!(json, "\"PROCESSING_FAILED\"");
        let parsed: VerdictStatus = serde_json::from_str("\"PASS\"").unwrap();
        assert_eq!(parsed, VerdictStatus::Pass);
    }
}
