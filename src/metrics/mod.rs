//! # Operational Counters
//!
//! Counter emission with at-most-once publication per logical processing
//! attempt. The emitter is an external substrate accepting partial batches of
//! at most 20 data per call; the idempotent publisher layered on top
//! guarantees that a redelivered invocation never double-counts.

pub mod emitter;
pub mod idempotency;

pub use emitter::{
    CounterDatum, CounterEmitter, CounterUnit, EmissionError, MemoryCounterEmitter,
};
pub use idempotency::{
    IdempotencyKey, IdempotencyStore, IdempotentCounterPublisher, MemoryIdempotencyStore,
    PublishOutcome,
};
