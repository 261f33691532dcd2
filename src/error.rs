//! Error types for the mailroute system.
//!
//! The taxonomy mirrors how failures propagate through the pipeline: store and
//! queue errors are transient infrastructure failures retried at the invocation
//! layer, handler-logic failures are permanent and left to the queue substrate's
//! redrive policy, and metric emission failures never propagate at all.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MailRouteError {
    #[error("Route store error: {0}")]
    StoreError(String),
    #[error("Dispatch error: {0}")]
    DispatchError(String),
    #[error("Queue error: {0}")]
    QueueError(String),
    #[error("Metric emission error: {0}")]
    EmissionError(String),
    #[error("Credential metadata error: {0}")]
    CredentialError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Timeout after {0:?}: {1}")]
    Timeout(Duration, String),
    #[error("State transition error: {0}")]
    StateTransitionError(String),
}

impl From<serde_json::Error> for MailRouteError {
    fn from(error: serde_json::Error) -> Self {
        MailRouteError::ValidationError(format!("JSON serialization error: {error}"))
    }
}

impl From<crate::routing::store::StoreError> for MailRouteError {
    fn from(error: crate::routing::store::StoreError) -> Self {
        MailRouteError::StoreError(error.to_string())
    }
}

impl From<crate::retry::queue::QueueError> for MailRouteError {
    fn from(error: crate::retry::queue::QueueError) -> Self {
        MailRouteError::QueueError(error.to_string())
    }
}

impl From<crate::metrics::emitter::EmissionError> for MailRouteError {
    fn from(error: crate::metrics::emitter::EmissionError) -> Self {
        MailRouteError::EmissionError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MailRouteError>;

/// Classification of a downstream handler invocation failure.
///
/// Only `Infrastructure` errors are eligible for the orchestrator's bounded
/// retry policy. `Handler` errors are permanent for this run and surface via
/// the source queue's dead-letter path. `CredentialExpired` is transient but
/// not immediately retryable: the handler routes the original message to the
/// retry queue instead of failing its own invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum InvokeError {
    /// Invocation substrate failure (throttle, timeout, transport). Retryable.
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
    /// Handler-logic failure (malformed payload, rejected request). Permanent.
    #[error("Handler error: {0}")]
    Handler(String),
    /// External credential has expired; the message belongs on the retry queue.
    #[error("Credential expired: {0}")]
    CredentialExpired(String),
}

impl InvokeError {
    /// Whether the orchestrator's invocation-layer retry policy applies.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }
}
