//! Retry-queue drain workflow.
//!
//! Control flow is an explicit tagged-state machine rather than nested
//! branching so each state's entry and exit conditions are independently
//! testable:
//!
//! ```text
//! ReadBatch --received(n>0)--> ProcessBatch --processed--> CheckForMore
//!     |                                                        |
//!     +--received(0)--> Done <--batch_short-------------------+
//!                                                              |
//!                        ReadBatch <--batch_full---------------+
//! ```

use super::backoff::BackoffPolicy;
use super::invoker::ReplayInvoker;
use super::queue::{RetryEnvelope, RetryQueue};
use crate::constants::counters;
use crate::error::{InvokeError, MailRouteError, Result};
use crate::metrics::{emitter::emit_chunked, CounterDatum, CounterEmitter};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Drain workflow states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainState {
    /// Long-poll the retry queue for the next batch.
    ReadBatch,
    /// Replay the received batch, one message at a time.
    ProcessBatch,
    /// Decide whether the queue may hold more messages.
    CheckForMore,
    /// Drain complete.
    Done,
}

impl DrainState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for DrainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadBatch => write!(f, "read_batch"),
            Self::ProcessBatch => write!(f, "process_batch"),
            Self::CheckForMore => write!(f, "check_for_more"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Signals that drive drain state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainSignal {
    /// A receive returned `count` messages.
    Received { count: usize },
    /// The current batch has been fully replayed.
    BatchProcessed,
    /// The last batch was full-sized; more may be waiting.
    BatchFull,
    /// The last batch was short; the queue is drained.
    BatchShort,
}

impl DrainState {
    /// Transition table. Any pairing outside it is a bug in the run loop, not
    /// a recoverable condition.
    pub fn next(self, signal: DrainSignal) -> Result<DrainState> {
        let target = match (self, signal) {
            (Self::ReadBatch, DrainSignal::Received { count: 0 }) => Self::Done,
            (Self::ReadBatch, DrainSignal::Received { .. }) => Self::ProcessBatch,
            (Self::ProcessBatch, DrainSignal::BatchProcessed) => Self::CheckForMore,
            (Self::CheckForMore, DrainSignal::BatchFull) => Self::ReadBatch,
            (Self::CheckForMore, DrainSignal::BatchShort) => Self::Done,
            (from, signal) => {
                return Err(MailRouteError::StateTransitionError(format!(
                    "No transition from {from} on {signal:?}"
                )))
            }
        };
        Ok(target)
    }
}

/// Orchestrator tuning; defaults mirror the deployed workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryOrchestratorConfig {
    /// Messages requested per receive.
    pub batch_size: usize,
    /// Long-poll window per receive.
    pub receive_wait_ms: u64,
    /// Hard wall-clock timeout for one handler invocation.
    pub invoke_timeout_ms: u64,
    /// Invocation-layer retry policy for infrastructure errors.
    pub backoff: BackoffPolicy,
}

impl Default for RetryOrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::constants::limits::MAX_RECEIVE_BATCH,
            receive_wait_ms: 5_000,
            invoke_timeout_ms: 60_000,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryOrchestratorConfig {
    fn receive_wait(&self) -> Duration {
        Duration::from_millis(self.receive_wait_ms)
    }

    fn invoke_timeout(&self) -> Duration {
        Duration::from_millis(self.invoke_timeout_ms)
    }
}

/// Summary of one drain run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrainReport {
    pub received: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub batches: usize,
    /// Receipt handles whose replay failed; these surfaced to the source
    /// queue's dead-letter path.
    pub failed_receipts: Vec<String>,
}

/// Drains the retry queue, replaying each message against the downstream
/// handler with bounded, serialized concurrency.
pub struct RetryOrchestrator {
    queue: Arc<dyn RetryQueue>,
    invoker: Arc<dyn ReplayInvoker>,
    emitter: Arc<dyn CounterEmitter>,
    namespace: String,
    config: RetryOrchestratorConfig,
}

impl RetryOrchestrator {
    pub fn new(
        queue: Arc<dyn RetryQueue>,
        invoker: Arc<dyn ReplayInvoker>,
        emitter: Arc<dyn CounterEmitter>,
        namespace: impl Into<String>,
        config: RetryOrchestratorConfig,
    ) -> Self {
        Self {
            queue,
            invoker,
            emitter,
            namespace: namespace.into(),
            config,
        }
    }

    /// Run the drain workflow to completion.
    ///
    /// Invoked on a fixed schedule and on demand after a credential refresh.
    /// Queue failures abort the run; an aborted run leaves leased messages to
    /// reappear after their visibility timeout, so re-running is safe.
    pub async fn run(&self) -> Result<DrainReport> {
        let mut state = DrainState::ReadBatch;
        let mut report = DrainReport::default();
        let mut batch: Vec<RetryEnvelope> = Vec::new();
        let mut last_batch_len = 0usize;

        loop {
            debug!(state = %state, "Drain state entered");
            state = match state {
                DrainState::ReadBatch => {
                    batch = self
                        .queue
                        .receive(self.config.batch_size, self.config.receive_wait())
                        .await?;
                    last_batch_len = batch.len();
                    report.received += batch.len();
                    if !batch.is_empty() {
                        report.batches += 1;
                    }
                    state.next(DrainSignal::Received { count: batch.len() })?
                }
                DrainState::ProcessBatch => {
                    // Serialized on purpose: ordered, rate-limited replay
                    // against a handler that may itself be rate-limited.
                    for message in batch.drain(..) {
                        match self.replay_message(&message).await? {
                            ReplayOutcome::Succeeded => report.succeeded += 1,
                            ReplayOutcome::Failed => {
                                report.failed += 1;
                                report.failed_receipts.push(message.receipt_handle.clone());
                            }
                        }
                    }
                    state.next(DrainSignal::BatchProcessed)?
                }
                DrainState::CheckForMore => {
                    let signal = if last_batch_len == self.config.batch_size {
                        DrainSignal::BatchFull
                    } else {
                        DrainSignal::BatchShort
                    };
                    state.next(signal)?
                }
                DrainState::Done => break,
            };
        }

        info!(
            received = report.received,
            succeeded = report.succeeded,
            failed = report.failed,
            batches = report.batches,
            "Retry drain complete"
        );

        if report.received > 0 {
            self.emit_completion(&report).await;
        }
        Ok(report)
    }

    /// Replay one message: bounded invocation retry, then delete.
    ///
    /// The message is deleted from the retry queue on both outcomes. A replay
    /// that keeps failing signals a non-transient problem, and surfacing it to
    /// the original source queue's dead-letter path beats requeueing it here
    /// forever.
    async fn replay_message(&self, message: &RetryEnvelope) -> Result<ReplayOutcome> {
        let mut attempt = 0u32;
        let outcome = loop {
            attempt += 1;
            match self.invoke_once(message).await {
                Ok(()) => {
                    debug!(
                        receipt_handle = %message.receipt_handle,
                        attempt = attempt,
                        "Replay succeeded"
                    );
                    break ReplayOutcome::Succeeded;
                }
                Err(e) if e.is_retryable() && self.config.backoff.allows_retry_after(attempt) => {
                    let delay = self.config.backoff.delay_for_attempt(attempt);
                    warn!(
                        receipt_handle = %message.receipt_handle,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Replay invocation failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        receipt_handle = %message.receipt_handle,
                        attempts = attempt,
                        error = %e,
                        "Replay failed permanently, escalating to source dead-letter path"
                    );
                    break ReplayOutcome::Failed;
                }
            }
        };

        self.queue.delete(&message.receipt_handle).await?;
        Ok(outcome)
    }

    async fn invoke_once(&self, message: &RetryEnvelope) -> std::result::Result<(), InvokeError> {
        match tokio::time::timeout(self.config.invoke_timeout(), self.invoker.invoke(message)).await
        {
            Ok(result) => result,
            // A hung invocation is an infrastructure error, not handler logic.
            Err(_) => Err(InvokeError::Infrastructure(format!(
                "invocation timed out after {}ms",
                self.config.invoke_timeout_ms
            ))),
        }
    }

    /// Completion counters are best-effort: a metrics outage must never fail
    /// a retry run that already drained the queue.
    async fn emit_completion(&self, report: &DrainReport) {
        let data = [
            CounterDatum::count(counters::RETRY_DRAIN_COMPLETED, 1),
            CounterDatum::count(counters::RETRY_REPLAY_SUCCESS, report.succeeded as u64),
            CounterDatum::count(counters::RETRY_REPLAY_FAILURE, report.failed as u64),
        ];
        if let Err(e) = emit_chunked(self.emitter.as_ref(), &self.namespace, &data).await {
            error!(error = %e, "Failed to emit drain completion counters");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplayOutcome {
    Succeeded,
    Failed,
}
