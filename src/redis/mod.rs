//! Redis Streams broker backend
//!
//! History lives in capped Redis streams, one per broadcast stream, next to a
//! timestamp index used to answer "since" queries. Offsets come from a per
//! stream counter incremented by the same server-side script that appends
//! the entry, so several instances can publish to one stream concurrently.
//!
//! ```text
//! {prefix}:s:{stream}     XADD <offset> d <payload>   (MAXLEN history_limit)
//! {prefix}:spos:{stream}  INCR                        (TTL history_ttl * 10)
//! {prefix}:sts:{stream}   XADD * pos <offset>         (MAXLEN history_limit)
//! {prefix}:se:{sid}       SET <snapshot> EX sessions_ttl
//! {prefix}:e              epoch token
//! ```

mod config;

#[cfg(feature = "redis")]
mod broker;

pub use config::RedisConfig;

#[cfg(feature = "redis")]
pub use broker::RedisBroker;
