//! # Retry Orchestrator
//!
//! Recovery workflow for messages whose downstream handler failed with an
//! expired external credential. The failing handler parks the original
//! message on a durable retry queue instead of failing its invocation; once
//! the credential is refreshed, the orchestrator drains that queue, replaying
//! each message against the handler one at a time with bounded invocation
//! retry, deleting on success and escalating persistent failures to the
//! original source queue's dead-letter path.

pub mod backoff;
pub mod invoker;
pub mod orchestrator;
pub mod queue;
pub mod recovery;

pub use backoff::BackoffPolicy;
pub use invoker::ReplayInvoker;
pub use orchestrator::{DrainReport, DrainSignal, DrainState, RetryOrchestrator, RetryOrchestratorConfig};
pub use queue::{MemoryRetryQueue, QueueError, RetryEnvelope, RetryQueue};
pub use recovery::RecoveringSubscriber;
