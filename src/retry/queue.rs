//! Retry queue substrate.
//!
//! The queue is a single-writer-per-message resource: the substrate's
//! visibility lease guarantees exactly one orchestrator run holds a given
//! message at a time, so the core implements no locking of its own. Redrive
//! to a dead-letter location after the maximum receive count is also owned by
//! the substrate, not by this module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

/// One leased message from the retry queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryEnvelope {
    /// The original invocation payload, carried verbatim.
    pub body: Value,
    /// Opaque lease token; proves the holder may delete this message.
    pub receipt_handle: String,
    /// How many times the substrate has handed this message out.
    pub approximate_receive_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Errors from the retry-queue substrate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueueError {
    #[error("Retry queue unavailable: {0}")]
    Unavailable(String),
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Receipt handle is not currently leased: {0}")]
    InvalidReceipt(String),
}

/// Durable retry queue with visibility-lease semantics.
#[async_trait]
pub trait RetryQueue: Send + Sync {
    /// Receive up to `max_messages`, long-polling for up to `wait` before
    /// returning an empty batch. Received messages become invisible to other
    /// consumers for the substrate's visibility timeout.
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<RetryEnvelope>, QueueError>;

    /// Permanently remove a currently-leased message.
    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError>;

    /// Enqueue an original payload for later replay.
    async fn send(&self, body: Value) -> Result<(), QueueError>;
}

struct StoredMessage {
    body: Value,
    enqueued_at: DateTime<Utc>,
    receive_count: u32,
    lease: Option<Lease>,
}

struct Lease {
    receipt_handle: String,
    expires_at: Instant,
}

#[derive(Default)]
struct QueueInner {
    messages: VecDeque<StoredMessage>,
}

/// In-memory retry queue; substrate stand-in with real lease semantics so the
/// orchestrator's contract is exercised end to end in tests.
#[derive(Clone)]
pub struct MemoryRetryQueue {
    inner: Arc<Mutex<QueueInner>>,
    notify: Arc<Notify>,
    visibility_timeout: Duration,
}

impl MemoryRetryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner::default())),
            notify: Arc::new(Notify::new()),
            visibility_timeout,
        }
    }

    /// Messages still on the queue, leased or not.
    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().messages.is_empty()
    }

    fn try_receive(&self, max_messages: usize) -> Vec<RetryEnvelope> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let mut received = Vec::new();

        for message in inner.messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }
            let leased = message
                .lease
                .as_ref()
                .is_some_and(|lease| lease.expires_at > now);
            if leased {
                continue;
            }

            let receipt_handle = Uuid::new_v4().to_string();
            message.receive_count += 1;
            message.lease = Some(Lease {
                receipt_handle: receipt_handle.clone(),
                expires_at: now + self.visibility_timeout,
            });
            received.push(RetryEnvelope {
                body: message.body.clone(),
                receipt_handle,
                approximate_receive_count: message.receive_count,
                enqueued_at: message.enqueued_at,
            });
        }

        received
    }
}

impl Default for MemoryRetryQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl RetryQueue for MemoryRetryQueue {
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<RetryEnvelope>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            let batch = self.try_receive(max_messages);
            if !batch.is_empty() {
                return Ok(batch);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }

            // Park until a send arrives or the long-poll window closes.
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(remaining) => {}
            }
        }
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let position = inner.messages.iter().position(|message| {
            message
                .lease
                .as_ref()
                .is_some_and(|lease| lease.receipt_handle == receipt_handle && lease.expires_at > now)
        });

        match position {
            Some(index) => {
                inner.messages.remove(index);
                Ok(())
            }
            None => Err(QueueError::InvalidReceipt(receipt_handle.to_string())),
        }
    }

    async fn send(&self, body: Value) -> Result<(), QueueError> {
        {
            let mut inner = self.inner.lock();
            inner.messages.push_back(StoredMessage {
                body,
                enqueued_at: Utc::now(),
                receive_count: 0,
                lease: None,
            });
        }
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_receive_leases_in_fifo_order() {
        let queue = MemoryRetryQueue::default();
        queue.send(json!({"n": 1})).await.unwrap();
        queue.send(json!({"n": 2})).await.unwrap();
        queue.send(json!({"n": 3})).await.unwrap();

        let batch = queue.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].body["n"], 1);
        assert_eq!(batch[2].body["n"], 3);
        assert!(batch.iter().all(|m| m.approximate_receive_count == 1));

        // Leased messages are invisible to a second consumer.
        let second = queue.receive(10, Duration::ZERO).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_requires_live_lease() {
        let queue = MemoryRetryQueue::default();
        queue.send(json!({})).await.unwrap();

        let batch = queue.receive(1, Duration::ZERO).await.unwrap();
        queue.delete(&batch[0].receipt_handle).await.unwrap();
        assert!(queue.is_empty());

        let err = queue.delete(&batch[0].receipt_handle).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidReceipt(_)));
    }

    #[tokio::test]
    async fn test_expired_lease_makes_message_visible_again() {
        let queue = MemoryRetryQueue::new(Duration::from_millis(10));
        queue.send(json!({})).await.unwrap();

        let first = queue.receive(1, Duration::ZERO).await.unwrap();
        assert_eq!(first[0].approximate_receive_count, 1);

        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = queue.receive(1, Duration::ZERO).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].approximate_receive_count, 2);

        // The stale receipt can no longer delete.
        let err = queue.delete(&first[0].receipt_handle).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidReceipt(_)));
    }

    #[tokio::test]
    async fn test_long_poll_wakes_on_send() {
        let queue = MemoryRetryQueue::default();
        let receiver = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.receive(1, Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.send(json!({"late": true})).await.unwrap();

        let batch = receiver.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_long_poll_times_out_empty() {
        let queue = MemoryRetryQueue::default();
        let batch = queue.receive(1, Duration::from_millis(20)).await.unwrap();
        assert!(batch.is_empty());
    }
}
