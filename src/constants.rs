//! # System Constants
//!
//! Core constants that define the operational boundaries of the mailroute
//! pipeline: store key prefixes, counter names, and substrate limits shared
//! across components.

/// Routing store key layout.
///
/// Rules live under a `ROUTE#` partition prefix with a versioned sort key so
/// that rule records share a table with other entity types.
pub mod store {
    /// Partition-key prefix for routing rules.
    pub const ROUTE_KEY_PREFIX: &str = "ROUTE#";
    /// Sort key for the current rule record version.
    pub const RULE_SORT_KEY: &str = "RULE#v1";
}

/// Counter names published through the idempotent counter publisher.
pub mod counters {
    // Resolver outcomes, one sample per inbound event.
    pub const ROUTER_RESOLVE_SUCCESS: &str = "RouterResolveSuccess";
    pub const ROUTER_RESOLVE_FAILURE: &str = "RouterResolveFailure";

    // Retry orchestrator run outcomes.
    pub const RETRY_DRAIN_COMPLETED: &str = "RetryDrainCompleted";
    pub const RETRY_REPLAY_SUCCESS: &str = "RetryReplaySuccess";
    pub const RETRY_REPLAY_FAILURE: &str = "RetryReplayFailure";

    // Expiration monitor gauges.
    pub const CREDENTIAL_REMAINING_SECONDS: &str = "CredentialRemainingSeconds";
    pub const CREDENTIAL_MONITOR_ERROR: &str = "CredentialMonitorError";
}

/// Substrate limits baked into external-service contracts.
pub mod limits {
    /// Maximum counter data accepted per emission call.
    pub const MAX_COUNTERS_PER_CALL: usize = 20;
    /// Maximum messages returned by one retry-queue receive.
    pub const MAX_RECEIVE_BATCH: usize = 10;
}

/// Event-bus source and detail-type identifiers for dispatched action events.
pub mod bus {
    pub const EVENT_SOURCE: &str = "mailroute.router";
    pub const DETAIL_TYPE_DECISION: &str = "routing-decision";
}
