//! # Dispatch Fan-out
//!
//! Turns a batch of routing decisions into one action event per distinct
//! action value and publishes each onto the event bus. Downstream subscribers
//! select events by content (the `action` field) with a minimum count
//! threshold; delivery guarantees - at-least-once, bounded redelivery, then
//! per-subscriber dead-letter - belong to the bus substrate the fan-out
//! publishes into.

use crate::constants::bus;
use crate::error::{MailRouteError, Result};
use crate::events::{
    Action, ActionEvent, EventPublisher, RoutingDecision, SubscriberRegistry,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Publishes decision batches onto the event bus.
#[derive(Clone)]
pub struct DispatchFanout {
    publisher: EventPublisher,
    registry: Arc<SubscriberRegistry>,
}

impl DispatchFanout {
    pub fn new(publisher: EventPublisher, registry: Arc<SubscriberRegistry>) -> Self {
        Self { publisher, registry }
    }

    /// Partition a decision batch by action, preserving batch order within
    /// each partition. Matching is exhaustive over the closed action set; no
    /// decision is dropped.
    fn partition(decisions: &[RoutingDecision]) -> Vec<(Action, Vec<RoutingDecision>)> {
        let mut groups: Vec<(Action, Vec<RoutingDecision>)> =
            Action::ALL.iter().map(|a| (*a, Vec::new())).collect();

        for decision in decisions {
            let slot = match decision.action {
                Action::Deliver => 0,
                Action::Reject => 1,
                Action::Monitor => 2,
            };
            groups[slot].1.push(decision.clone());
        }

        groups.retain(|(_, group)| !group.is_empty());
        groups
    }

    /// Emit one event per distinct action present in the batch and hand each
    /// to the bus.
    pub async fn dispatch(&self, decisions: &[RoutingDecision]) -> Result<()> {
        if decisions.is_empty() {
            debug!("Empty decision batch, nothing to dispatch");
            return Ok(());
        }

        for (action, group) in Self::partition(decisions) {
            let event = ActionEvent {
                source: bus::EVENT_SOURCE.to_string(),
                detail_type: bus::DETAIL_TYPE_DECISION.to_string(),
                action,
                count: group.len(),
                decisions: group,
                published_at: Utc::now(),
            };

            info!(
                correlation_id = %event.decisions[0].correlation_id,
                action = %action,
                count = event.count,
                "Dispatching action event"
            );

            self.publisher
                .publish(event.clone())
                .map_err(|e| MailRouteError::DispatchError(e.to_string()))?;
            self.registry.deliver(&event).await;
        }

        Ok(())
    }
}
