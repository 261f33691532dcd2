//! Hierarchical routing resolution.

use super::address::EmailAddress;
use super::store::{RouteStore, StoreError};
use crate::events::{Action, InboundEvent, MatchKind, RoutingDecision};
use std::sync::Arc;
use tracing::{debug, warn};

/// The route selected for one recipient before event context is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionOutcome {
    pub matched_key: MatchKind,
    pub action: Action,
    pub target: String,
}

impl ResolutionOutcome {
    /// Deterministic default applied when no enabled rule matches.
    fn default_reject() -> Self {
        Self {
            matched_key: MatchKind::Default,
            action: Action::Reject,
            target: String::new(),
        }
    }
}

/// Resolves recipient addresses to routing decisions against a point-in-time
/// snapshot of the routing store.
///
/// Resolution is a pure function of (recipient, store snapshot): at most four
/// sequential point reads, short-circuiting on the first enabled match. The
/// resolver performs no retries; store failures propagate to the caller as
/// transient errors for the invocation layer to handle.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn RouteStore>,
}

impl Resolver {
    pub fn new(store: Arc<dyn RouteStore>) -> Self {
        Self { store }
    }

    /// Resolve one recipient through the fallback chain.
    ///
    /// Disabled rules are skipped and the chain continues; a rule further down
    /// may still match. No match at any level yields the default reject
    /// outcome - unmatched recipients must never silently vanish.
    pub async fn resolve_recipient(
        &self,
        recipient: &EmailAddress,
    ) -> Result<ResolutionOutcome, StoreError> {
        for (kind, key) in recipient.lookup_keys() {
            let Some(rule) = self.store.get(&key).await? else {
                continue;
            };

            if !rule.enabled {
                debug!(
                    recipient = %recipient,
                    pattern = key.pattern(),
                    "Rule is disabled, continuing search"
                );
                continue;
            }

            debug!(
                recipient = %recipient,
                pattern = key.pattern(),
                matched_key = %kind,
                action = %rule.action,
                "Routing rule matched"
            );
            return Ok(ResolutionOutcome {
                matched_key: kind,
                action: rule.action,
                target: rule.target,
            });
        }

        warn!(
            recipient = %recipient,
            "No routing rule found, defaulting to reject"
        );
        Ok(ResolutionOutcome::default_reject())
    }

    /// Resolve one recipient of one inbound event into a full decision.
    ///
    /// Recipients of a message that failed security screening resolve straight
    /// to reject without consulting the store.
    pub async fn resolve(
        &self,
        recipient: &EmailAddress,
        event: &InboundEvent,
    ) -> Result<RoutingDecision, StoreError> {
        if event.verdicts.requires_reject() {
            debug!(
                correlation_id = %event.correlation_id,
                message_id = %event.message_id,
                recipient = %recipient,
                "Security verdicts failed, rejecting without lookup"
            );
            return Ok(RoutingDecision::default_reject(
                recipient.as_str(),
                &event.message_id,
                event.verdicts.clone(),
                event.correlation_id,
            ));
        }

        let outcome = self.resolve_recipient(recipient).await?;
        Ok(RoutingDecision {
            recipient: recipient.as_str().to_string(),
            matched_key: outcome.matched_key,
            action: outcome.action,
            target: outcome.target,
            source_message_id: event.message_id.clone(),
            verdicts: event.verdicts.clone(),
            correlation_id: event.correlation_id,
        })
    }

    /// Fan an inbound event out into one decision per recipient.
    ///
    /// Lookups stay sequential so a store outage surfaces after at most one
    /// recipient's worth of reads.
    pub async fn resolve_event(
        &self,
        event: &InboundEvent,
    ) -> Result<Vec<RoutingDecision>, StoreError> {
        let mut decisions = Vec::with_capacity(event.recipients.len());
        for recipient in &event.recipients {
            let address = EmailAddress::new(recipient.clone());
            decisions.push(self.resolve(&address, event).await?);
        }
        Ok(decisions)
    }
}
