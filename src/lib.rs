//! # cable-broker
//!
//! Stream history, session recovery and fan-out for realtime pub/sub gateways.
//!
//! A [`Broker`] assigns per-stream offsets to incoming broadcasts, keeps a
//! bounded, time-limited history so reconnecting clients can catch up, and
//! stores short-lived session snapshots keyed by a recovery id. Offsets are
//! scoped by an epoch: when the backing store loses data, the epoch changes
//! and stale client positions are rejected instead of served wrong data.
//!
//! # Backends
//!
//! | Adapter  | History          | Sessions        | Presence   | Multi-instance |
//! |----------|------------------|-----------------|------------|----------------|
//! | `memory` | in process       | in process      | in process | no             |
//! | `redis`  | Redis Streams    | Redis keys      | no         | yes            |
//! | `nats`   | not stored       | JetStream KV    | no         | yes            |
//! | `legacy` | not supported    | not stored      | no         | n/a            |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cable_broker::{build_broker, Broadcaster, Config, RemoteCommandMessage, StreamMessage};
//!
//! struct Hub;
//!
//! impl Broadcaster for Hub {
//!     fn broadcast(&self, msg: &StreamMessage) {
//!         println!("{} #{}", msg.stream, msg.offset);
//!     }
//!     fn broadcast_command(&self, _msg: &RemoteCommandMessage) {}
//!     fn subscribe(&self, _stream: &str) {}
//!     fn unsubscribe(&self, _stream: &str) {}
//! }
//!
//! #[tokio::main]
//! async fn main() -> cable_broker::Result<()> {
//!     let broker = build_broker(&Config::default(), Arc::new(Hub))?;
//!     broker.start().await?;
//!
//!     broker.subscribe("chat");
//!     broker.handle_broadcast(StreamMessage::new("chat", "hello")).await?;
//!
//!     broker.shutdown().await
//! }
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod memory;
pub mod message;
pub mod nats;
pub mod redis;

pub use broker::{
    build_broker, generate_epoch, Adapter, Broadcaster, Broker, BrokerConfig, Cacheable,
    LegacyBroker, PresenceEvent, PresenceEventKind, PresenceInfo, PresenceInfoOptions,
    StreamsTracker, PRESENCE_BROADCAST_TYPE,
};
pub use config::Config;
pub use error::{BoxError, BrokerError, Result};
pub use memory::MemoryBroker;
pub use message::{RemoteCommandMessage, StreamMessage, StreamMessageMetadata};
pub use nats::NatsConfig;
pub use self::redis::RedisConfig;

#[cfg(feature = "nats")]
pub use nats::NatsBroker;
#[cfg(feature = "redis")]
pub use self::redis::RedisBroker;
