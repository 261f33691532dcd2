//! Credential-expiry recovery seam for downstream handlers.

use super::queue::RetryQueue;
use crate::error::InvokeError;
use crate::events::{ActionEvent, ActionSubscriber};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Wraps a downstream handler so that a credential-expired failure parks the
/// original message on the retry queue instead of failing the invocation.
///
/// Failing the invocation would count against the source queue's receive
/// budget and eventually dead-letter a message that only needs a refreshed
/// credential. Parking it keeps the dead-letter path reserved for real
/// failures; the retry orchestrator replays the queue once the credential is
/// refreshed. Every other error classification passes through untouched.
pub struct RecoveringSubscriber {
    name: String,
    inner: Arc<dyn ActionSubscriber>,
    retry_queue: Arc<dyn RetryQueue>,
}

impl RecoveringSubscriber {
    pub fn new(
        name: impl Into<String>,
        inner: Arc<dyn ActionSubscriber>,
        retry_queue: Arc<dyn RetryQueue>,
    ) -> Self {
        Self {
            name: name.into(),
            inner,
            retry_queue,
        }
    }
}

#[async_trait]
impl ActionSubscriber for RecoveringSubscriber {
    async fn handle_event(&self, event: &ActionEvent) -> Result<(), InvokeError> {
        match self.inner.handle_event(event).await {
            Err(InvokeError::CredentialExpired(reason)) => {
                let body = serde_json::to_value(event)
                    .map_err(|e| InvokeError::Handler(format!("unserializable event: {e}")))?;

                match self.retry_queue.send(body).await {
                    Ok(()) => {
                        info!(
                            subscriber = %self.name,
                            action = %event.action,
                            reason = %reason,
                            "Credential expired, message parked on retry queue"
                        );
                        Ok(())
                    }
                    Err(e) => {
                        // Parking failed; surface the original classification
                        // so the source queue redelivers.
                        warn!(
                            subscriber = %self.name,
                            error = %e,
                            "Failed to park message on retry queue"
                        );
                        Err(InvokeError::CredentialExpired(reason))
                    }
                }
            }
            other => other,
        }
    }

    fn subscriber_name(&self) -> &str {
        &self.name
    }
}
