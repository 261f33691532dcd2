//! End-to-end inbound processing: resolve, count, dispatch.
//!
//! One `process_event` call is one logical invocation of the enrichment
//! function: it resolves every recipient against the routing store, publishes
//! resolver counters through the idempotent publisher (side channel, never
//! fatal), and fans the decisions out onto the event bus. The whole run sits
//! under a hard wall-clock budget; exceeding it is an infrastructure error for
//! the invocation layer's retry policy, not a routing outcome.

use crate::constants::counters;
use crate::dispatch::DispatchFanout;
use crate::error::{MailRouteError, Result};
use crate::events::{InboundEvent, RoutingDecision};
use crate::metrics::{CounterDatum, IdempotencyKey, IdempotentCounterPublisher};
use crate::routing::Resolver;
use std::time::Duration;
use tracing::{error, info};

/// Inbound event pipeline wiring the resolver, counter publisher, and
/// dispatch fan-out together.
#[derive(Clone)]
pub struct InboundPipeline {
    resolver: Resolver,
    counter_publisher: IdempotentCounterPublisher,
    fanout: DispatchFanout,
    resolve_budget: Duration,
}

impl InboundPipeline {
    pub fn new(
        resolver: Resolver,
        counter_publisher: IdempotentCounterPublisher,
        fanout: DispatchFanout,
        resolve_budget: Duration,
    ) -> Self {
        Self {
            resolver,
            counter_publisher,
            fanout,
            resolve_budget,
        }
    }

    /// Process one inbound event under this invocation's execution id.
    ///
    /// Returns the resolved decisions after dispatch. Store failures and
    /// budget exhaustion propagate as transient errors so the surrounding
    /// queue substrate redelivers; counter-publication failures are logged and
    /// swallowed.
    pub async fn process_event(
        &self,
        execution_id: &str,
        event: &InboundEvent,
    ) -> Result<Vec<RoutingDecision>> {
        let key = IdempotencyKey::derive(execution_id, std::slice::from_ref(&event.message_id));

        let resolved = tokio::time::timeout(self.resolve_budget, self.resolver.resolve_event(event))
            .await
            .map_err(|_| {
                MailRouteError::Timeout(self.resolve_budget, "resolution budget exceeded".into())
            });

        let decisions = match resolved {
            Ok(Ok(decisions)) => decisions,
            Ok(Err(store_error)) => {
                self.publish_counters(
                    &key,
                    &[CounterDatum::count(counters::ROUTER_RESOLVE_FAILURE, 1)],
                )
                .await;
                return Err(store_error.into());
            }
            Err(timeout) => {
                self.publish_counters(
                    &key,
                    &[CounterDatum::count(counters::ROUTER_RESOLVE_FAILURE, 1)],
                )
                .await;
                return Err(timeout);
            }
        };

        info!(
            correlation_id = %event.correlation_id,
            message_id = %event.message_id,
            decision_count = decisions.len(),
            "Resolved inbound event"
        );

        self.publish_counters(
            &key,
            &[CounterDatum::count(
                counters::ROUTER_RESOLVE_SUCCESS,
                decisions.len() as u64,
            )],
        )
        .await;

        self.fanout.dispatch(&decisions).await?;
        Ok(decisions)
    }

    /// Counter publication side channel; failures never fail the invocation.
    async fn publish_counters(&self, key: &IdempotencyKey, data: &[CounterDatum]) {
        if let Err(e) = self.counter_publisher.publish_once(key, data).await {
            error!(
                idempotency_key = %key,
                error = %e,
                "Failed to publish resolver counters"
            );
        }
    }
}
