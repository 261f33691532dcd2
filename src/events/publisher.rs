//! Event-bus publisher for dispatched action events.

use super::types::{Action, RoutingDecision};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// One dispatched event: every decision in the batch that resolved to the same
/// action, with the count subscribers filter on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEvent {
    pub source: String,
    pub detail_type: String,
    pub action: Action,
    /// Number of decisions carried; subscribers declare a minimum threshold of 1.
    pub count: usize,
    pub decisions: Vec<RoutingDecision>,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

/// High-throughput publisher for action events.
///
/// Publishing succeeds even with no subscribers attached; events are facts
/// about routing outcomes, not requests awaiting a response.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<ActionEvent>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an action event onto the bus.
    pub fn publish(&self, event: ActionEvent) -> Result<(), PublishError> {
        match self.sender.send(event) {
            Ok(_) => Ok(()),
            // No subscribers - acceptable, the event is still published
            Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }

    /// Subscribe to the raw event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ActionEvent> {
        self.sender.subscribe()
    }

    /// Number of active raw-stream subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Error types for event publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event channel is closed")]
    ChannelClosed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::bus;
    use crate::events::inbound::Verdicts;
    use crate::events::types::MatchKind;
    use uuid::Uuid;

    fn sample_event(action: Action) -> ActionEvent {
        ActionEvent {
            source: bus::EVENT_SOURCE.to_string(),
            detail_type: bus::DETAIL_TYPE_DECISION.to_string(),
            action,
            count: 1,
            decisions: vec![RoutingDecision {
                recipient: "a@example.com".into(),
                matched_key: MatchKind::Exact,
                action,
                target: "inbox-1".into(),
                source_message_id: "msg-1".into(),
                verdicts: Verdicts::all_pass(),
                correlation_id: Uuid::new_v4(),
            }],
            published_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_succeeds() {
        let publisher = EventPublisher::new(16);
        assert!(publisher.publish(sample_event(Action::Deliver)).is_ok());
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let publisher = EventPublisher::new(16);
        let mut receiver = publisher.subscribe();

        publisher.publish(sample_event(Action::Monitor)).unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.action, Action::Monitor);
        assert_eq!(received.count, 1);
    }
}
