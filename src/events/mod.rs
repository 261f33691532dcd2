//! # Event Model and Bus
//!
//! Inbound message events, routing decisions, and the event bus substrate that
//! carries dispatched action events to downstream subscribers.
//!
//! Payloads are closed sum types: the `action` tag is an exhaustively matched
//! enum, and unknown action values fail at the deserialization boundary rather
//! than being silently ignored.

pub mod inbound;
pub mod publisher;
pub mod subscriber;
pub mod types;

pub use inbound::{InboundEvent, VerdictStatus, Verdicts};
pub use publisher::{ActionEvent, EventPublisher, PublishError};
pub use subscriber::{ActionSubscriber, DeadLetteredEvent, SubscriberRegistry};
pub use types::{Action, MatchKind, RoutingDecision};
