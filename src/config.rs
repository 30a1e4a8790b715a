//! Top-level configuration
//!
//! Groups broker options with the settings of each external backend. Backend
//! sections are always present, whether or not the backend is compiled in.

use crate::broker::BrokerConfig;
use crate::nats::NatsConfig;
use crate::redis::RedisConfig;

/// Broker and backend settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub broker: BrokerConfig,
    pub redis: RedisConfig,
    pub nats: NatsConfig,
}

impl Config {
    /// Render every option as a commented TOML document
    pub fn to_toml(&self) -> String {
        let mut out = String::new();

        out.push_str("[broker]\n");
        out.push_str(&self.broker.to_toml());
        out.push_str("\n[redis]\n");
        out.push_str(&self.redis.to_toml());
        out.push_str("\n[nats]\n");
        out.push_str(&self.nats.to_toml());

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Adapter;

    #[test]
    fn test_to_toml_sections() {
        let mut config = Config::default();
        config.broker = config.broker.adapter(Adapter::Redis).history_limit(0);

        let toml = config.to_toml();

        assert!(toml.starts_with("[broker]\n"));
        assert!(toml.contains("adapter = \"redis\"\n"));
        assert!(toml.contains("history_limit = 0\n"));
        assert!(toml.contains("\n[redis]\n# Redis URL\n"));
        assert!(toml.contains("\n[nats]\n"));
        assert!(toml.contains("servers = \"nats://127.0.0.1:4222\"\n"));
    }

    #[test]
    fn test_every_line_is_comment_or_assignment() {
        let toml = Config::default().to_toml();

        for line in toml.lines().filter(|l| !l.is_empty()) {
            assert!(
                line.starts_with('#') || line.starts_with('[') || line.contains(" = "),
                "unexpected line: {line}"
            );
        }
    }
}
