//! Redis connection configuration

/// Redis backend options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// Redis URL (`redis://` or `rediss://`)
    pub url: String,

    /// Namespace prepended to every key managed by the broker
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "$ac".to_string(),
        }
    }
}

impl RedisConfig {
    /// Set the Redis URL
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the key namespace
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Host (and port) part of the URL, without credentials
    pub fn hostname(&self) -> &str {
        let rest = self
            .url
            .split_once("://")
            .map_or(self.url.as_str(), |(_, rest)| rest);
        let rest = rest.rsplit_once('@').map_or(rest, |(_, host)| host);

        rest.split('/').next().unwrap_or(rest)
    }

    /// Render as a commented TOML section body
    pub fn to_toml(&self) -> String {
        let mut out = String::new();

        out.push_str("# Redis URL\n");
        out.push_str(&format!("url = \"{}\"\n", self.url));
        out.push_str("# Namespace for broker keys\n");
        out.push_str(&format!("key_prefix = \"{}\"\n", self.key_prefix));

        out
    }
}
