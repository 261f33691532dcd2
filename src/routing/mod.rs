//! # Routing Resolver
//!
//! Turns a normalized recipient address into a routing decision through a
//! hierarchical fallback chain of point reads against the routing store:
//! exact address, plus-tag-normalized address, domain wildcard, global
//! wildcard. First enabled match wins; no match falls back to a deterministic
//! reject decision.

pub mod address;
pub mod resolver;
pub mod rule;
pub mod store;

pub use address::EmailAddress;
pub use resolver::{ResolutionOutcome, Resolver};
pub use rule::RoutingRule;
pub use store::{MemoryRouteStore, RouteKey, RouteStore, StoreError};
