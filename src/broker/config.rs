//! Broker configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{BrokerError, Result};

/// Backend implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Adapter {
    /// Single-instance, in-process history and sessions
    #[default]
    Memory,
    /// Redis Streams history shared by every instance
    Redis,
    /// NATS JetStream key-value sessions
    Nats,
    /// No history, no sessions; fan-out only
    Legacy,
}

impl Adapter {
    /// Configuration name of the adapter
    pub fn as_str(&self) -> &'static str {
        match self {
            Adapter::Memory => "memory",
            Adapter::Redis => "redis",
            Adapter::Nats => "nats",
            Adapter::Legacy => "legacy",
        }
    }
}

impl fmt::Display for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Adapter {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Adapter::Memory),
            "redis" => Ok(Adapter::Redis),
            "nats" => Ok(Adapter::Nats),
            "legacy" | "none" => Ok(Adapter::Legacy),
            other => Err(BrokerError::Config(format!("unknown broker adapter: {other}"))),
        }
    }
}

/// Broker configuration options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Backend adapter
    pub adapter: Adapter,

    /// How long a history entry survives
    pub history_ttl: Duration,

    /// Max number of entries kept per stream (0 = no count limit)
    pub history_limit: usize,

    /// How long a session snapshot survives after disconnect
    pub sessions_ttl: Duration,

    /// How long presence records survive without a touch
    pub presence_ttl: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            adapter: Adapter::Memory,
            history_ttl: Duration::from_secs(5 * 60),
            history_limit: 100,
            sessions_ttl: Duration::from_secs(5 * 60),
            presence_ttl: Duration::from_secs(15),
        }
    }
}

impl BrokerConfig {
    /// Set the adapter
    pub fn adapter(mut self, adapter: Adapter) -> Self {
        self.adapter = adapter;
        self
    }

    /// Set the history TTL
    pub fn history_ttl(mut self, ttl: Duration) -> Self {
        self.history_ttl = ttl;
        self
    }

    /// Set the per-stream history limit
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Set the sessions TTL
    pub fn sessions_ttl(mut self, ttl: Duration) -> Self {
        self.sessions_ttl = ttl;
        self
    }

    /// Set the presence TTL
    pub fn presence_ttl(mut self, ttl: Duration) -> Self {
        self.presence_ttl = ttl;
        self
    }

    /// History TTL in whole seconds (at least 1)
    pub fn history_ttl_secs(&self) -> u64 {
        self.history_ttl.as_secs().max(1)
    }

    /// Sessions TTL in whole seconds (at least 1)
    pub fn sessions_ttl_secs(&self) -> u64 {
        self.sessions_ttl.as_secs().max(1)
    }

    /// TTL for epoch keys shared between instances
    ///
    /// An epoch must outlive every offset and session issued under it.
    pub fn epoch_ttl(&self) -> Duration {
        self.history_ttl.max(self.sessions_ttl) * 10
    }

    /// Check option ranges
    pub fn validate(&self) -> Result<()> {
        if self.history_ttl.as_secs() == 0 {
            return Err(BrokerError::Config(
                "history_ttl must be at least 1 second".into(),
            ));
        }

        if self.sessions_ttl.as_secs() == 0 {
            return Err(BrokerError::Config(
                "sessions_ttl must be at least 1 second".into(),
            ));
        }

        if self.presence_ttl.is_zero() {
            return Err(BrokerError::Config("presence_ttl must not be zero".into()));
        }

        Ok(())
    }

    /// Render as a commented TOML section body
    pub fn to_toml(&self) -> String {
        let mut out = String::new();

        out.push_str("# Broker backend adapter (memory, redis, nats, legacy)\n");
        out.push_str(&format!("adapter = \"{}\"\n", self.adapter));
        out.push_str("# For how long to keep streams history (seconds)\n");
        out.push_str(&format!("history_ttl = {}\n", self.history_ttl.as_secs()));
        out.push_str("# Max number of messages to keep in a stream history (0 = unlimited)\n");
        out.push_str(&format!("history_limit = {}\n", self.history_limit));
        out.push_str("# For how long to store sessions state for resumeability (seconds)\n");
        out.push_str(&format!("sessions_ttl = {}\n", self.sessions_ttl.as_secs()));
        out.push_str("# For how long to keep presence information after session disconnect (seconds)\n");
        out.push_str(&format!("presence_ttl = {}\n", self.presence_ttl.as_secs()));

        out
    }
}
