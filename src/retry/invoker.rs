//! Handler re-invocation seam for the retry orchestrator.

use super::queue::RetryEnvelope;
use crate::error::InvokeError;
use async_trait::async_trait;

/// Synchronous re-invocation of the original downstream handler for one
/// parked message.
///
/// The orchestrator retries `Infrastructure` errors with bounded backoff;
/// `Handler` and `CredentialExpired` errors are final for the replay attempt.
#[async_trait]
pub trait ReplayInvoker: Send + Sync {
    async fn invoke(&self, message: &RetryEnvelope) -> Result<(), InvokeError>;
}
