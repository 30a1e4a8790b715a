//! Broker contract and shared building blocks
//!
//! A broker sits between the connection layer and the fan-out machinery:
//!
//! ```text
//!   connection layer                           Broadcaster
//!  ┌────────────────┐   handle_broadcast()   ┌─────────────┐
//!  │ subscribe()    │ ─────────────────────► │ broadcast() │ ──► clients
//!  │ history_from() │   append + offset      │ subscribe() │
//!  │ commit_session │                        └─────────────┘
//!  └───────┬────────┘
//!          │
//!          ▼
//!   dyn Broker ── StreamsTracker (local interest)
//!              ── history store  (offsets, epoch)
//!              ── session cache  (recovery snapshots)
//!              ── presence       (who is in a stream)
//! ```
//!
//! Backends live in [`crate::memory`], [`crate::redis`] and [`crate::nats`];
//! [`LegacyBroker`] keeps nothing and only forwards. Use [`build_broker`] to
//! pick one from configuration.

mod builder;
pub mod config;
pub mod epoch;
mod legacy;
pub mod presence;
mod tracker;
mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::build_broker;
pub use config::{Adapter, BrokerConfig};
pub use epoch::generate_epoch;
pub use legacy::LegacyBroker;
pub use presence::{
    PresenceEvent, PresenceEventKind, PresenceInfo, PresenceInfoOptions, PRESENCE_BROADCAST_TYPE,
};
pub use tracker::StreamsTracker;
pub use traits::{Broadcaster, Broker, Cacheable};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
