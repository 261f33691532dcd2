//! Counter emission substrate.

use crate::constants::limits::MAX_COUNTERS_PER_CALL;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Unit attached to one counter datum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterUnit {
    Count,
    Seconds,
}

impl fmt::Display for CounterUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => f.write_str("Count"),
            Self::Seconds => f.write_str("Seconds"),
        }
    }
}

/// One named counter or gauge sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterDatum {
    pub name: String,
    pub value: f64,
    pub unit: CounterUnit,
}

impl CounterDatum {
    pub fn count(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value: value as f64,
            unit: CounterUnit::Count,
        }
    }

    pub fn seconds(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            unit: CounterUnit::Seconds,
        }
    }
}

/// Errors from the counter emission substrate.
///
/// Emission failure is never fatal to the invocation that triggered it;
/// callers log and swallow, or - in the idempotent publisher - leave the key
/// unmarked so a redelivery retries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmissionError {
    #[error("Counter emission call failed: {0}")]
    CallFailed(String),
    #[error("Counter emission rejected batch of {size} (limit {limit})")]
    BatchTooLarge { size: usize, limit: usize },
}

/// External counter emission call: one namespace, up to 20 data per call,
/// one success/failure per call.
#[async_trait]
pub trait CounterEmitter: Send + Sync {
    async fn emit(&self, namespace: &str, data: &[CounterDatum]) -> Result<(), EmissionError>;
}

/// Emit a datum set in substrate-sized chunks, skipping zero-valued counters.
///
/// Returns on the first failed call; data already emitted stay emitted.
pub async fn emit_chunked(
    emitter: &dyn CounterEmitter,
    namespace: &str,
    data: &[CounterDatum],
) -> Result<usize, EmissionError> {
    let nonzero: Vec<CounterDatum> = data.iter().filter(|d| d.value != 0.0).cloned().collect();
    if nonzero.is_empty() {
        return Ok(0);
    }

    for chunk in nonzero.chunks(MAX_COUNTERS_PER_CALL) {
        emitter.emit(namespace, chunk).await?;
    }
    Ok(nonzero.len())
}

/// In-memory emitter for tests: records every successful call and can be
/// scripted to fail the first N calls.
#[derive(Clone, Default)]
pub struct MemoryCounterEmitter {
    inner: Arc<Mutex<MemoryEmitterState>>,
}

#[derive(Default)]
struct MemoryEmitterState {
    calls: Vec<(String, Vec<CounterDatum>)>,
    failures_remaining: usize,
}

impl MemoryCounterEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` emission calls before succeeding.
    pub fn fail_next(&self, n: usize) {
        self.inner.lock().failures_remaining = n;
    }

    /// Every successful call, in order.
    pub fn calls(&self) -> Vec<(String, Vec<CounterDatum>)> {
        self.inner.lock().calls.clone()
    }

    /// Sum of emitted values for one counter name across all calls.
    pub fn total_for(&self, name: &str) -> f64 {
        self.inner
            .lock()
            .calls
            .iter()
            .flat_map(|(_, data)| data.iter())
            .filter(|d| d.name == name)
            .map(|d| d.value)
            .sum()
    }
}

#[async_trait]
impl CounterEmitter for MemoryCounterEmitter {
    async fn emit(&self, namespace: &str, data: &[CounterDatum]) -> Result<(), EmissionError> {
        if data.len() > MAX_COUNTERS_PER_CALL {
            return Err(EmissionError::BatchTooLarge {
                size: data.len(),
                limit: MAX_COUNTERS_PER_CALL,
            });
        }

        let mut state = self.inner.lock();
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(EmissionError::CallFailed("simulated emission failure".into()));
        }
        state.calls.push((namespace.to_string(), data.to_vec()));
        Ok(())
    }
}
