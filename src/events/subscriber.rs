//! # Subscriber Registry
//!
//! Content-based subscriptions over dispatched action events.
//!
//! Each subscriber declares interest in one `action` value and a minimum
//! decision count (1 in every deployed rule). Delivery is at-least-once:
//! a failing subscriber is retried up to a bounded attempt count, then the
//! event is redirected to that subscriber's dead-letter sink. Subscribers are
//! expected to be idempotent or tolerate duplicate processing.
//!
//! This registry is the in-process stand-in for the external event-bus
//! contract; the fan-out relies on these semantics rather than reimplementing
//! them per handler.

use super::publisher::ActionEvent;
use super::types::Action;
use crate::error::InvokeError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Trait for downstream action handlers subscribed to the bus.
#[async_trait]
pub trait ActionSubscriber: Send + Sync {
    /// Handle one delivered event. Returning an error triggers redelivery up
    /// to the bus's bounded attempt count.
    async fn handle_event(&self, event: &ActionEvent) -> Result<(), InvokeError>;

    /// Subscriber name for identification in logs and dead-letter records.
    fn subscriber_name(&self) -> &str {
        "unnamed_subscriber"
    }
}

/// An event that exhausted its delivery attempts for one subscriber.
#[derive(Debug, Clone)]
pub struct DeadLetteredEvent {
    pub subscriber_id: String,
    pub event: ActionEvent,
    pub attempts: u32,
    pub last_error: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Subscription information
#[derive(Clone)]
struct Subscription {
    subscriber_id: String,
    action: Action,
    min_count: usize,
    subscriber: Arc<dyn ActionSubscriber>,
    events_received: u64,
    last_event_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("subscriber_id", &self.subscriber_id)
            .field("action", &self.action)
            .field("min_count", &self.min_count)
            .field("events_received", &self.events_received)
            .field("last_event_at", &self.last_event_at)
            .finish()
    }
}

/// Registry for managing action-event subscribers.
pub struct SubscriberRegistry {
    subscriptions: Arc<RwLock<HashMap<String, Subscription>>>,
    /// Per-subscriber dead-letter sinks, appended when delivery attempts are
    /// exhausted.
    dead_letters: Arc<RwLock<HashMap<String, Vec<DeadLetteredEvent>>>>,
    max_delivery_attempts: u32,
}

impl SubscriberRegistry {
    /// Create a registry with the given per-subscriber delivery attempt bound.
    pub fn new(max_delivery_attempts: u32) -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            dead_letters: Arc::new(RwLock::new(HashMap::new())),
            max_delivery_attempts: max_delivery_attempts.max(1),
        }
    }

    /// Register a subscriber for one action value with a minimum count
    /// threshold.
    pub async fn register_subscriber(
        &self,
        subscriber_id: &str,
        action: Action,
        min_count: usize,
        subscriber: Arc<dyn ActionSubscriber>,
    ) {
        let subscription = Subscription {
            subscriber_id: subscriber_id.to_string(),
            action,
            min_count: min_count.max(1),
            subscriber,
            events_received: 0,
            last_event_at: None,
        };

        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.insert(subscriber_id.to_string(), subscription);

        info!(
            subscriber_id = subscriber_id,
            action = %action,
            "Registered subscriber"
        );
    }

    /// Unregister a subscriber. Returns whether it existed.
    pub async fn unregister_subscriber(&self, subscriber_id: &str) -> bool {
        let removed = self.subscriptions.write().await.remove(subscriber_id);
        if removed.is_some() {
            info!(subscriber_id = subscriber_id, "Unregistered subscriber");
        }
        removed.is_some()
    }

    /// Deliver an event to every matching subscriber.
    ///
    /// A subscriber matches when its declared action equals the event's action
    /// and the event's count meets the subscriber's threshold. Subscribers are
    /// independent consumers, so delivery to them runs concurrently.
    /// Per-subscriber failures never fail the delivery round; they end in that
    /// subscriber's dead-letter sink.
    pub async fn deliver(&self, event: &ActionEvent) {
        let matching = self.find_matching_subscribers(event).await;

        if matching.is_empty() {
            debug!(action = %event.action, "No subscribers for action");
            return;
        }

        let deliveries = matching
            .iter()
            .map(|subscriber_id| self.deliver_to_subscriber(subscriber_id, event));
        futures::future::join_all(deliveries).await;
    }

    async fn find_matching_subscribers(&self, event: &ActionEvent) -> Vec<String> {
        let subscriptions = self.subscriptions.read().await;
        subscriptions
            .values()
            .filter(|s| s.action == event.action && event.count >= s.min_count)
            .map(|s| s.subscriber_id.clone())
            .collect()
    }

    /// Deliver to one subscriber with bounded attempts, dead-lettering on
    /// exhaustion.
    async fn deliver_to_subscriber(&self, subscriber_id: &str, event: &ActionEvent) {
        let subscriber = {
            let mut subscriptions = self.subscriptions.write().await;
            match subscriptions.get_mut(subscriber_id) {
                Some(subscription) => {
                    subscription.events_received += 1;
                    subscription.last_event_at = Some(Utc::now());
                    subscription.subscriber.clone()
                }
                None => return,
            }
        };

        let mut last_error = String::new();
        for attempt in 1..=self.max_delivery_attempts {
            match subscriber.handle_event(event).await {
                Ok(()) => {
                    debug!(
                        subscriber_id = subscriber_id,
                        action = %event.action,
                        attempt = attempt,
                        "Delivered action event"
                    );
                    return;
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        subscriber_id = subscriber_id,
                        action = %event.action,
                        attempt = attempt,
                        error = %last_error,
                        "Subscriber delivery attempt failed"
                    );
                }
            }
        }

        error!(
            subscriber_id = subscriber_id,
            action = %event.action,
            attempts = self.max_delivery_attempts,
            "Delivery attempts exhausted, dead-lettering event"
        );

        let mut dead_letters = self.dead_letters.write().await;
        dead_letters
            .entry(subscriber_id.to_string())
            .or_default()
            .push(DeadLetteredEvent {
                subscriber_id: subscriber_id.to_string(),
                event: event.clone(),
                attempts: self.max_delivery_attempts,
                last_error,
                dead_lettered_at: Utc::now(),
            });
    }

    /// Drain one subscriber's dead-letter sink.
    pub async fn take_dead_letters(&self, subscriber_id: &str) -> Vec<DeadLetteredEvent> {
        self.dead_letters
            .write()
            .await
            .remove(subscriber_id)
            .unwrap_or_default()
    }

    /// List registered subscriber ids.
    pub async fn list_subscribers(&self) -> Vec<String> {
        self.subscriptions.read().await.keys().cloned().collect()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::bus;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct TestSubscriber {
        id: String,
        events_handled: Arc<AtomicU64>,
        failures_remaining: AtomicU64,
    }

    impl TestSubscriber {
        fn new(id: &str) -> Self {
            Self::failing(id, 0)
        }

        fn failing(id: &str, failures: u64) -> Self {
            Self {
                id: id.to_string(),
                events_handled: Arc::new(AtomicU64::new(0)),
                failures_remaining: AtomicU64::new(failures),
            }
        }

        fn events_handled(&self) -> u64 {
            self.events_handled.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl ActionSubscriber for TestSubscriber {
        async fn handle_event(&self, _event: &ActionEvent) -> Result<(), InvokeError> {
            if self
                .failures_remaining
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(InvokeError::Infrastructure("simulated failure".into()));
            }
            self.events_handled.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn subscriber_name(&self) -> &str {
            &self.id
        }
    }

    fn event_for(action: Action, count: usize) -> ActionEvent {
        ActionEvent {
            source: bus::EVENT_SOURCE.to_string(),
            detail_type: bus::DETAIL_TYPE_DECISION.to_string(),
            action,
            count,
            decisions: Vec::new(),
            published_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_matching_subscriber_receives_event() {
        let registry = SubscriberRegistry::new(3);
        let subscriber = Arc::new(TestSubscriber::new("deliverer"));
        registry
            .register_subscriber("deliverer", Action::Deliver, 1, subscriber.clone())
            .await;

        registry.deliver(&event_for(Action::Deliver, 2)).await;
        registry.deliver(&event_for(Action::Reject, 1)).await;

        assert_eq!(subscriber.events_handled(), 1);
    }

    #[tokio::test]
    async fn test_count_threshold_filters_events() {
        let registry = SubscriberRegistry::new(3);
        let subscriber = Arc::new(TestSubscriber::new("bulk"));
        registry
            .register_subscriber("bulk", Action::Reject, 3, subscriber.clone())
            .await;

        registry.deliver(&event_for(Action::Reject, 2)).await;
        assert_eq!(subscriber.events_handled(), 0);

        registry.deliver(&event_for(Action::Reject, 3)).await;
        assert_eq!(subscriber.events_handled(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_within_bound() {
        let registry = SubscriberRegistry::new(3);
        let subscriber = Arc::new(TestSubscriber::failing("flaky", 2));
        registry
            .register_subscriber("flaky", Action::Monitor, 1, subscriber.clone())
            .await;

        registry.deliver(&event_for(Action::Monitor, 1)).await;

        assert_eq!(subscriber.events_handled(), 1);
        assert!(registry.take_dead_letters("flaky").await.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_delivery_dead_letters_event() {
        let registry = SubscriberRegistry::new(2);
        let subscriber = Arc::new(TestSubscriber::failing("broken", u64::MAX));
        registry
            .register_subscriber("broken", Action::Deliver, 1, subscriber.clone())
            .await;

        registry.deliver(&event_for(Action::Deliver, 1)).await;

        let dead = registry.take_dead_letters("broken").await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);
        assert_eq!(subscriber.events_handled(), 0);
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery() {
        let registry = SubscriberRegistry::new(3);
        let subscriber = Arc::new(TestSubscriber::new("gone"));
        registry
            .register_subscriber("gone", Action::Deliver, 1, subscriber.clone())
            .await;

        assert!(registry.unregister_subscriber("gone").await);
        registry.deliver(&event_for(Action::Deliver, 1)).await;
        assert_eq!(subscriber.events_handled(), 0);
    }
}
