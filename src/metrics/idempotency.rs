//! Idempotent counter publication.
//!
//! Inbound processing runs under at-least-once redelivery, so the same logical
//! invocation can execute more than once. Publication state is keyed per
//! logical attempt - a deterministic identifier over the execution id and the
//! batch's message ids - and held in a short-TTL keyed store, never a
//! process-wide flag. A key is marked published only after the emission call
//! reports success, so a failed emission is retried on redelivery while a
//! succeeded one is never repeated: at most one successful publication per
//! key, with under-counting on persistent failure as the accepted bias.

use super::emitter::{emit_chunked, CounterDatum, CounterEmitter, EmissionError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Deterministic identifier for one logical counter publication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derive a key from the invocation's execution identifier and the
    /// message ids in the batch being processed.
    ///
    /// Message ids are sorted before hashing so re-deliveries that present the
    /// same batch in a different order derive the same key.
    pub fn derive(execution_id: &str, message_ids: &[String]) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut sorted: Vec<&str> = message_ids.iter().map(String::as_str).collect();
        sorted.sort_unstable();

        let mut hasher = DefaultHasher::new();
        for id in &sorted {
            id.hash(&mut hasher);
        }
        Self(format!("{execution_id}#{:x}", hasher.finish()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one `publish_once` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Counters were emitted and the key marked.
    Published,
    /// The key was already marked; no side effect.
    Skipped,
}

/// Keyed publication-state store.
///
/// The deployed variant persists entries with a short time-to-live so that a
/// platform-level re-invocation with a fresh execution context still
/// recognizes prior completion.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Whether this key has already been published.
    async fn is_published(&self, key: &IdempotencyKey) -> bool;
    /// Record that this key's counters were successfully emitted.
    async fn mark_published(&self, key: &IdempotencyKey);
}

/// In-memory keyed store with TTL eviction; stands in for the external
/// short-TTL store and backs tests.
#[derive(Clone)]
pub struct MemoryIdempotencyStore {
    entries: Arc<DashMap<String, Instant>>,
    ttl: Duration,
}

impl MemoryIdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryIdempotencyStore {
    fn default() -> Self {
        // Short TTL: long enough to cover the redelivery window, short enough
        // that the store never accumulates.
        Self::new(Duration::from_secs(15 * 60))
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn is_published(&self, key: &IdempotencyKey) -> bool {
        // The read guard must drop before the eviction below touches the
        // same shard.
        let fresh = self
            .entries
            .get(key.as_str())
            .map(|entry| entry.elapsed() < self.ttl);
        match fresh {
            Some(true) => true,
            Some(false) => {
                self.entries.remove(key.as_str());
                false
            }
            None => false,
        }
    }

    async fn mark_published(&self, key: &IdempotencyKey) {
        self.entries.insert(key.as_str().to_string(), Instant::now());
    }
}

/// Counter publisher with at-most-once-successful-publication per key.
#[derive(Clone)]
pub struct IdempotentCounterPublisher {
    emitter: Arc<dyn CounterEmitter>,
    store: Arc<dyn IdempotencyStore>,
    namespace: String,
}

impl IdempotentCounterPublisher {
    pub fn new(
        emitter: Arc<dyn CounterEmitter>,
        store: Arc<dyn IdempotencyStore>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            emitter,
            store,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Publish the counters for `key` unless a prior attempt already
    /// succeeded.
    ///
    /// The key is marked published only after emission succeeds; on emission
    /// failure the key stays unmarked and the error propagates so the caller
    /// can decide whether the surrounding invocation retries.
    pub async fn publish_once(
        &self,
        key: &IdempotencyKey,
        counters: &[CounterDatum],
    ) -> Result<PublishOutcome, EmissionError> {
        if self.store.is_published(key).await {
            debug!(
                idempotency_key = %key,
                "Counters already published for key, skipping"
            );
            return Ok(PublishOutcome::Skipped);
        }

        match emit_chunked(self.emitter.as_ref(), &self.namespace, counters).await {
            Ok(emitted) => {
                self.store.mark_published(key).await;
                info!(
                    idempotency_key = %key,
                    namespace = %self.namespace,
                    emitted = emitted,
                    "Published counters"
                );
                Ok(PublishOutcome::Published)
            }
            Err(e) => {
                warn!(
                    idempotency_key = %key,
                    error = %e,
                    "Counter emission failed, key left unmarked for retry"
                );
                Err(e)
            }
        }
    }
}
