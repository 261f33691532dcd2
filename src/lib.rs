#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # MailRoute Core
//!
//! Routing-resolution engine and retry/recovery orchestrator for inbound mail
//! events.
//!
//! ## Overview
//!
//! Inbound message-processing events are resolved to routing decisions
//! through a fallback chain of key lookups, dispatched to downstream handlers
//! over an event bus with at-least-once delivery, and recovered from
//! credential-expiry failures through a dedicated retry workflow. Operational
//! counters are published at most once per logical processing attempt.
//!
//! ## Architecture
//!
//! Every component runs as an independent, stateless, short-lived invocation
//! triggered by an external event or schedule. The durable queue, the
//! key-value routing store, the event bus, and the counter emission substrate
//! are external collaborators behind traits; in-memory implementations with
//! the same contracts back the test suite.
//!
//! Data flow:
//!
//! ```text
//! inbound event -> Resolver (reads routing store) -> routing decisions
//!     -> IdempotentCounterPublisher (side channel)
//!     -> DispatchFanout -> event bus -> downstream handlers
//!                                           |
//!                          credential expired? park on retry queue
//!                                           |
//!              RetryOrchestrator drains after credential refresh
//! ```
//!
//! ## Module Organization
//!
//! - [`routing`] - Hierarchical routing resolution against the rule store
//! - [`events`] - Event model, bus publisher, and subscriber registry
//! - [`dispatch`] - Decision fan-out onto the event bus
//! - [`metrics`] - Counter emission and idempotent publication
//! - [`retry`] - Retry queue drain workflow and backoff policy
//! - [`monitor`] - Credential expiration monitor
//! - [`pipeline`] - End-to-end inbound event processing
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mailroute_core::config::ConfigManager;
//! use mailroute_core::events::Action;
//! use mailroute_core::routing::{MemoryRouteStore, Resolver, RoutingRule};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//!
//! let store = MemoryRouteStore::new();
//! store.put(RoutingRule::new("user@example.com", Action::Deliver, "inbox-1"));
//!
//! let resolver = Resolver::new(Arc::new(store));
//! let outcome = resolver
//!     .resolve_recipient(&"user+tag@example.com".into())
//!     .await?;
//! println!("matched {} -> {}", outcome.matched_key, outcome.target);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod pipeline;
pub mod retry;
pub mod routing;

pub use config::{
    ConfigManager, DispatchConfig, MailRouteConfig, MetricsConfig, MonitorConfig, ResolverConfig,
    RetryConfig,
};
pub use dispatch::DispatchFanout;
pub use error::{InvokeError, MailRouteError, Result};
pub use events::{
    Action, ActionEvent, ActionSubscriber, EventPublisher, InboundEvent, MatchKind,
    RoutingDecision, SubscriberRegistry, VerdictStatus, Verdicts,
};
pub use metrics::{
    CounterDatum, CounterEmitter, CounterUnit, IdempotencyKey, IdempotentCounterPublisher,
    PublishOutcome,
};
pub use monitor::{CredentialMetadata, CredentialMetadataSource, ExpirationMonitor};
pub use pipeline::InboundPipeline;
pub use retry::{
    BackoffPolicy, DrainReport, DrainState, MemoryRetryQueue, RetryEnvelope, RetryOrchestrator,
    RetryQueue,
};
pub use routing::{EmailAddress, MemoryRouteStore, Resolver, RouteStore, RoutingRule};
