//! NATS connection configuration

/// NATS backend options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatsConfig {
    /// Comma-separated list of server URLs
    pub servers: String,

    /// Reconnect attempts before the client gives up
    pub max_reconnect_attempts: usize,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: "nats://127.0.0.1:4222".to_string(),
            max_reconnect_attempts: 5,
        }
    }
}

impl NatsConfig {
    /// Set the server list
    pub fn servers(mut self, servers: impl Into<String>) -> Self {
        self.servers = servers.into();
        self
    }

    /// Set the reconnect limit
    pub fn max_reconnect_attempts(mut self, attempts: usize) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Render as a commented TOML section body
    pub fn to_toml(&self) -> String {
        let mut out = String::new();

        out.push_str("# Comma-separated NATS server URLs\n");
        out.push_str(&format!("servers = \"{}\"\n", self.servers));
        out.push_str("# Reconnect attempts before giving up\n");
        out.push_str(&format!(
            "max_reconnect_attempts = {}\n",
            self.max_reconnect_attempts
        ));

        out
    }
}
