//! NATS JetStream key-value broker backend
//!
//! Sessions are kept in a key-value bucket whose TTL equals the sessions TTL.
//! The epoch lives in a bucket of its own. Stream history is not stored by
//! this backend yet: history queries succeed with no entries.

mod config;

#[cfg(feature = "nats")]
mod broker;

pub use config::NatsConfig;

#[cfg(feature = "nats")]
pub use broker::NatsBroker;
