//! NATS JetStream key-value broker implementation

use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{self, kv};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use serde_json::Value;
use tokio::sync::RwLock;

use super::config::NatsConfig;
use crate::broker::epoch::{generate_epoch, EpochCell};
use crate::broker::{
    Broadcaster, Broker, BrokerConfig, Cacheable, PresenceEvent, PresenceInfo,
    PresenceInfoOptions, StreamsTracker,
};
use crate::error::{BrokerError, Result};
use crate::message::{RemoteCommandMessage, StreamMessage};

const SESSIONS_BUCKET: &str = "_anycable_sessions_";
const EPOCH_BUCKET: &str = "_anycable_epoch_";
const EPOCH_KEY: &str = "_epoch_";

/// Handles created on start
#[derive(Clone)]
struct Connection {
    client: async_nats::Client,
    sessions: kv::Store,
    epochs: kv::Store,
}

/// Broker keeping sessions in NATS key-value buckets
///
/// Broadcasts are delivered to the broadcaster as is: no offsets are assigned
/// and history queries return nothing. Presence is not tracked.
pub struct NatsBroker {
    broadcaster: Arc<dyn Broadcaster>,
    config: BrokerConfig,
    nats_config: NatsConfig,
    tracker: StreamsTracker,
    epoch: EpochCell,

    /// `None` until started and after shutdown
    conn: RwLock<Option<Connection>>,
}

impl NatsBroker {
    /// Create a broker; no connection is made until [`Broker::start`]
    pub fn new(
        broadcaster: Arc<dyn Broadcaster>,
        config: BrokerConfig,
        nats_config: NatsConfig,
    ) -> Self {
        Self {
            broadcaster,
            config,
            nats_config,
            tracker: StreamsTracker::new(),
            epoch: EpochCell::default(),
            conn: RwLock::new(None),
        }
    }

    /// Current epoch
    pub fn epoch(&self) -> String {
        self.epoch.get()
    }

    /// Overwrite the shared epoch
    pub async fn set_epoch(&self, epoch: impl Into<String>) -> Result<()> {
        let epoch = epoch.into();
        let conn = self.connection().await?;

        conn.epochs
            .put(EPOCH_KEY, Bytes::from(epoch.clone()))
            .await
            .map_err(|e| BrokerError::backend("failed to set epoch", e))?;

        self.epoch.set(epoch);
        Ok(())
    }

    /// Purge every stored session
    pub async fn reset(&self) -> Result<()> {
        let conn = self.connection().await?;

        let keys: Vec<String> = conn
            .sessions
            .keys()
            .await
            .map_err(|e| BrokerError::backend("failed to list session keys", e))?
            .try_collect()
            .await
            .map_err(|e| BrokerError::backend("failed to list session keys", e))?;

        for key in &keys {
            conn.sessions
                .purge(key)
                .await
                .map_err(|e| BrokerError::backend("failed to purge session", e))?;
        }

        tracing::info!(purged = keys.len(), "NATS broker reset");
        Ok(())
    }

    /// Clone the connection handles out of their guard
    async fn connection(&self) -> Result<Connection> {
        self.conn.read().await.clone().ok_or(BrokerError::NotStarted)
    }

    /// Open a bucket, recreating it if its TTL differs from the configured one
    async fn fetch_bucket(
        &self,
        js: &jetstream::Context,
        name: &str,
        ttl: Duration,
    ) -> Result<kv::Store> {
        if let Ok(store) = js.get_key_value(name).await {
            let status = store
                .status()
                .await
                .map_err(|e| BrokerError::backend("failed to retrieve bucket status", e))?;

            if status.max_age() == ttl {
                return Ok(store);
            }

            tracing::warn!(
                bucket = %name,
                current = ?status.max_age(),
                configured = ?ttl,
                "Bucket TTL changed, recreating"
            );

            js.delete_key_value(name)
                .await
                .map_err(|e| BrokerError::backend("failed to delete bucket", e))?;

            return self.create_bucket(js, name, ttl).await;
        }

        self.create_bucket(js, name, ttl).await
    }

    async fn create_bucket(
        &self,
        js: &jetstream::Context,
        name: &str,
        ttl: Duration,
    ) -> Result<kv::Store> {
        tracing::debug!(bucket = %name, ttl = ?ttl, "Creating bucket");

        js.create_key_value(kv::Config {
            bucket: name.to_string(),
            max_age: ttl,
            history: 1,
            ..Default::default()
        })
        .await
        .map_err(|e| BrokerError::backend("failed to create bucket", e))
    }

    /// Store a fresh epoch unless one exists, then return the stored value
    async fn establish_epoch(&self, epochs: &kv::Store) -> Result<String> {
        let proposed = generate_epoch();

        match epochs.create(EPOCH_KEY, Bytes::from(proposed.clone())).await {
            Ok(_) => return Ok(proposed),
            Err(e) if e.kind() == kv::CreateErrorKind::AlreadyExists => {}
            Err(e) => return Err(BrokerError::backend("failed to create epoch", e)),
        }

        let stored = epochs
            .get(EPOCH_KEY)
            .await
            .map_err(|e| BrokerError::backend("failed to retrieve epoch", e))?;

        match stored {
            Some(value) => Ok(String::from_utf8_lossy(&value).into_owned()),
            None => Err(BrokerError::backend(
                "failed to retrieve epoch",
                "epoch key disappeared after creation conflict",
            )),
        }
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn start(&self) -> Result<()> {
        let client = async_nats::ConnectOptions::new()
            .max_reconnects(self.nats_config.max_reconnect_attempts)
            .retry_on_initial_connect()
            .connect(self.nats_config.servers.as_str())
            .await
            .map_err(|e| BrokerError::backend("failed to connect to NATS", e))?;

        let js = jetstream::new(client.clone());

        let sessions = self
            .fetch_bucket(&js, SESSIONS_BUCKET, self.config.sessions_ttl)
            .await?;
        let epochs = self
            .fetch_bucket(&js, EPOCH_BUCKET, self.config.epoch_ttl())
            .await?;

        let epoch = self.establish_epoch(&epochs).await?;
        self.epoch.set(epoch.clone());

        *self.conn.write().await = Some(Connection {
            client,
            sessions,
            epochs,
        });

        tracing::info!(servers = %self.nats_config.servers, epoch = %epoch, "NATS broker started");
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let Some(conn) = self.conn.write().await.take() else {
            return Ok(());
        };

        if let Err(e) = conn.client.flush().await {
            tracing::warn!(error = %e, "Failed to flush NATS connection");
        }

        tracing::debug!("NATS broker connection closed");
        Ok(())
    }

    fn announce(&self) -> String {
        format!(
            "Using NATS broker at {} (sessions ttl: {}s)",
            self.nats_config.servers,
            self.config.sessions_ttl_secs(),
        )
    }

    async fn handle_broadcast(&self, msg: StreamMessage) -> Result<()> {
        self.broadcaster.broadcast(&msg);
        Ok(())
    }

    async fn handle_command(&self, msg: RemoteCommandMessage) -> Result<()> {
        self.broadcaster.broadcast_command(&msg);
        Ok(())
    }

    fn subscribe(&self, stream: &str) -> String {
        if self.tracker.add(stream) {
            self.broadcaster.subscribe(stream);
        }

        stream.to_string()
    }

    fn unsubscribe(&self, stream: &str) -> String {
        if self.tracker.remove(stream) {
            self.broadcaster.unsubscribe(stream);
        }

        stream.to_string()
    }

    async fn history_from(
        &self,
        _stream: &str,
        epoch: &str,
        _offset: u64,
    ) -> Result<Vec<StreamMessage>> {
        self.connection().await?;

        if !self.epoch.matches(epoch) {
            return Err(BrokerError::EpochMismatch {
                requested: epoch.to_string(),
                current: self.epoch(),
            });
        }

        Ok(Vec::new())
    }

    async fn history_since(&self, _stream: &str, _since: i64) -> Result<Vec<StreamMessage>> {
        self.connection().await?;
        Ok(Vec::new())
    }

    async fn commit_session(&self, sid: &str, session: &dyn Cacheable) -> Result<()> {
        let conn = self.connection().await?;
        let data = session
            .to_cache_entry()
            .map_err(BrokerError::Serialization)?;

        conn.sessions
            .put(sid, data)
            .await
            .map_err(|e| BrokerError::backend("failed to store session in NATS", e))?;

        Ok(())
    }

    async fn restore_session(&self, sid: &str) -> Result<Option<Bytes>> {
        let conn = self.connection().await?;

        conn.sessions
            .get(sid)
            .await
            .map_err(|e| BrokerError::backend("failed to restore session from NATS", e))
    }

    async fn finish_session(&self, sid: &str) -> Result<()> {
        let conn = self.connection().await?;

        // Rewriting the value restarts the bucket TTL for the key
        let current = conn
            .sessions
            .get(sid)
            .await
            .map_err(|e| BrokerError::backend("failed to restore session from NATS", e))?;

        let Some(data) = current else {
            tracing::trace!(sid = %sid, "Finishing unknown session");
            return Ok(());
        };

        conn.sessions
            .put(sid, data)
            .await
            .map_err(|e| BrokerError::backend("failed to touch session in NATS", e))?;

        Ok(())
    }

    async fn presence_add(
        &self,
        _stream: &str,
        _sid: &str,
        _pid: &str,
        _info: Value,
    ) -> Result<Option<PresenceEvent>> {
        Err(BrokerError::PresenceNotSupported)
    }

    async fn presence_remove(&self, _stream: &str, _sid: &str) -> Result<Option<PresenceEvent>> {
        Err(BrokerError::PresenceNotSupported)
    }

    async fn presence_info(
        &self,
        _stream: &str,
        _opts: PresenceInfoOptions,
    ) -> Result<PresenceInfo> {
        Err(BrokerError::PresenceNotSupported)
    }

    async fn touch_presence(&self, _sid: &str) -> Result<()> {
        Ok(())
    }
}
