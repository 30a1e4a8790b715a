//! In-process broker implementation

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tokio::task::JoinHandle;

use super::history::{HistoryEntry, HistoryLog};
use super::presence::PresenceState;
use super::sessions::SessionCache;
use crate::broker::epoch::{generate_epoch, EpochCell};
use crate::broker::{
    unix_now, Broadcaster, Broker, BrokerConfig, Cacheable, PresenceEvent, PresenceInfo,
    PresenceInfoOptions, StreamsTracker,
};
use crate::error::{BrokerError, Result};
use crate::message::{RemoteCommandMessage, StreamMessage};

/// How often expired history and sessions are swept
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// State shared with the sweep task
struct MemoryState {
    config: BrokerConfig,

    epoch: EpochCell,

    /// Stream name to history log; the map lock is held for lookup and
    /// creation only, appends lock the individual log
    streams: RwLock<HashMap<String, Arc<RwLock<HistoryLog>>>>,

    sessions: RwLock<SessionCache>,

    presence: RwLock<PresenceState>,
}

impl MemoryState {
    async fn get(&self, stream: &str) -> Option<Arc<RwLock<HistoryLog>>> {
        self.streams.read().await.get(stream).cloned()
    }

    async fn get_or_create(&self, stream: &str) -> Arc<RwLock<HistoryLog>> {
        if let Some(log) = self.get(stream).await {
            return log;
        }

        let mut streams = self.streams.write().await;

        Arc::clone(streams.entry(stream.to_string()).or_insert_with(|| {
            Arc::new(RwLock::new(HistoryLog::new(
                self.config.history_ttl_secs(),
                self.config.history_limit,
            )))
        }))
    }

    /// Lock the live log of a stream for writing
    ///
    /// A log retired by the sweep after it was looked up is skipped, and the
    /// lookup is repeated against the registry.
    async fn lock_live(&self, stream: &str) -> OwnedRwLockWriteGuard<HistoryLog> {
        loop {
            let log = self.get_or_create(stream).await.write_owned().await;

            if !log.is_retired() {
                return log;
            }

            tracing::trace!(stream = %stream, "History log retired during lookup, retrying");
        }
    }

    async fn append(&self, stream: &str, data: Bytes, now: i64) -> u64 {
        self.lock_live(stream).await.append(data, now)
    }

    /// Expire history, sessions and presence
    ///
    /// Returns the presence leave notifications to fan out.
    async fn sweep(&self, now_unix: i64, now: Instant) -> Vec<StreamMessage> {
        {
            let mut streams = self.streams.write().await;
            let mut dead = Vec::new();

            for (name, log) in streams.iter() {
                let mut log = log.write().await;
                let evicted = log.expire(now_unix);

                if evicted > 0 {
                    tracing::trace!(stream = %name, evicted = evicted, low = log.low(), "History entries expired");
                }

                if log.is_dead(now_unix) {
                    log.retire();
                    dead.push(name.clone());
                }
            }

            for name in dead {
                streams.remove(&name);
                tracing::debug!(stream = %name, "Idle stream history removed");
            }
        }

        let removed = self.sessions.write().await.expire(now);

        if removed > 0 {
            tracing::debug!(removed = removed, "Expired sessions removed");
        }

        let events = self.presence.write().await.expire(now);
        let mut messages = Vec::with_capacity(events.len());

        for (stream, event) in events {
            tracing::debug!(stream = %stream, pid = %event.id, "Presence expired");

            match event.to_message(&stream) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    tracing::warn!(stream = %stream, error = %e, "Failed to encode presence event")
                }
            }
        }

        messages
    }

    fn to_messages(&self, stream: &str, entries: Vec<HistoryEntry>) -> Vec<StreamMessage> {
        let epoch = self.epoch.get();

        entries
            .into_iter()
            .map(|entry| StreamMessage::from_history(stream, entry.data, entry.offset, &epoch))
            .collect()
    }
}

/// Single-instance broker keeping history and sessions in memory
///
/// The epoch is generated once per broker and never changes unless set
/// explicitly, so a process restart invalidates every client offset.
pub struct MemoryBroker {
    broadcaster: Arc<dyn Broadcaster>,
    tracker: StreamsTracker,
    state: Arc<MemoryState>,
    sweeper: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl MemoryBroker {
    /// Create a broker with a fresh random epoch
    pub fn new(broadcaster: Arc<dyn Broadcaster>, config: BrokerConfig) -> Self {
        let sessions = SessionCache::new(config.sessions_ttl);
        let presence = PresenceState::new(config.presence_ttl);

        Self {
            broadcaster,
            tracker: StreamsTracker::new(),
            state: Arc::new(MemoryState {
                config,
                epoch: EpochCell::new(generate_epoch()),
                streams: RwLock::new(HashMap::new()),
                sessions: RwLock::new(sessions),
                presence: RwLock::new(presence),
            }),
            sweeper: parking_lot::Mutex::new(None),
        }
    }

    /// Get the broker configuration
    pub fn config(&self) -> &BrokerConfig {
        &self.state.config
    }

    /// Current epoch
    pub fn epoch(&self) -> String {
        self.state.epoch.get()
    }

    /// Replace the epoch (e.g. to follow an external store's generation)
    pub fn set_epoch(&self, epoch: impl Into<String>) {
        self.state.epoch.set(epoch);
    }

    /// Store an entry under an offset assigned elsewhere
    ///
    /// `timestamp` is unix time in seconds. Fails if `offset` is not greater
    /// than the stream's current offset.
    pub async fn store(
        &self,
        stream: &str,
        data: impl Into<Bytes>,
        offset: u64,
        timestamp: i64,
    ) -> Result<u64> {
        self.state
            .lock_live(stream)
            .await
            .insert(data.into(), offset, timestamp, unix_now())
    }

    /// Number of streams with a history log
    pub async fn stream_count(&self) -> usize {
        self.state.streams.read().await.len()
    }

    /// Run the expiration sweep once, broadcasting expired presence
    pub async fn sweep(&self) {
        for msg in self.state.sweep(unix_now(), Instant::now()).await {
            self.broadcaster.broadcast(&msg);
        }
    }

    /// Spawn the background sweep task
    ///
    /// Returns a handle that can be used to abort the task.
    fn spawn_sweep_task(&self) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let broadcaster = Arc::clone(&self.broadcaster);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;

                for msg in state.sweep(unix_now(), Instant::now()).await {
                    broadcaster.broadcast(&msg);
                }
            }
        })
    }

    fn fan_out(&self, msg: &StreamMessage) {
        if self.tracker.has(&msg.stream) {
            self.broadcaster.broadcast(msg);
        } else {
            tracing::trace!(stream = %msg.stream, "No local subscribers, skipping fan-out");
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn start(&self) -> Result<()> {
        let mut sweeper = self.sweeper.lock();

        if sweeper.is_none() {
            *sweeper = Some(self.spawn_sweep_task());
            tracing::debug!(epoch = %self.epoch(), "Memory broker started");
        }

        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }

        Ok(())
    }

    fn announce(&self) -> String {
        let config = &self.state.config;

        format!(
            "Using in-memory broker (epoch: {}, history limit: {}, history ttl: {}s, sessions ttl: {}s, presence ttl: {}s)",
            self.epoch(),
            config.history_limit,
            config.history_ttl_secs(),
            config.sessions_ttl_secs(),
            config.presence_ttl.as_secs(),
        )
    }

    async fn handle_broadcast(&self, mut msg: StreamMessage) -> Result<()> {
        if msg.is_transient() {
            self.fan_out(&msg);
            return Ok(());
        }

        msg.offset = self
            .state
            .append(&msg.stream, msg.data.clone(), unix_now())
            .await;
        msg.epoch = self.epoch();

        tracing::trace!(stream = %msg.stream, offset = msg.offset, "Message added to history");

        self.fan_out(&msg);
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
        stream: &str,
        epoch: &str,
        offset: u64,
    ) -> Result<Vec<StreamMessage>> {
        if !self.state.epoch.matches(epoch) {
            return Err(BrokerError::EpochMismatch {
                requested: epoch.to_string(),
                current: self.epoch(),
            });
        }

        let log = self
            .state
            .get(stream)
            .await
            .ok_or_else(|| BrokerError::StreamNotFound(stream.to_string()))?;

        let entries = log.read().await.after(stream, offset)?;

        Ok(self.state.to_messages(stream, entries))
    }

    async fn history_since(&self, stream: &str, since: i64) -> Result<Vec<StreamMessage>> {
        let Some(log) = self.state.get(stream).await else {
            return Ok(Vec::new());
        };

        let entries = log.read().await.since(since);

        Ok(self.state.to_messages(stream, entries))
    }

    async fn commit_session(&self, sid: &str, session: &dyn Cacheable) -> Result<()> {
        let data = session
            .to_cache_entry()
            .map_err(BrokerError::Serialization)?;

        self.state
            .sessions
            .write()
            .await
            .commit(sid, data, Instant::now());

        Ok(())
    }

    async fn restore_session(&self, sid: &str) -> Result<Option<Bytes>> {
        Ok(self.state.sessions.read().await.restore(sid, Instant::now()))
    }

    async fn finish_session(&self, sid: &str) -> Result<()> {
        if !self.state.sessions.write().await.touch(sid, Instant::now()) {
            tracing::trace!(sid = %sid, "Finishing unknown session");
        }

        Ok(())
    }

    async fn presence_add(
        &self,
        stream: &str,
        sid: &str,
        pid: &str,
        info: Value,
    ) -> Result<Option<PresenceEvent>> {
        let event = self
            .state
            .presence
            .write()
            .await
            .add(stream, sid, pid, info, Instant::now())?;

        if event.is_some() {
            tracing::trace!(stream = %stream, sid = %sid, pid = %pid, "Presence joined");
        }

        Ok(event)
    }

    async fn presence_remove(&self, stream: &str, sid: &str) -> Result<Option<PresenceEvent>> {
        let event = self.state.presence.write().await.remove(stream, sid)?;

        if let Some(ref leave) = event {
            tracing::trace!(stream = %stream, sid = %sid, pid = %leave.id, "Presence left");
        }

        Ok(event)
    }

    async fn presence_info(
        &self,
        stream: &str,
        opts: PresenceInfoOptions,
    ) -> Result<PresenceInfo> {
        Ok(self.state.presence.read().await.info(stream, opts))
    }

    async fn touch_presence(&self, sid: &str) -> Result<()> {
        self.state.presence.write().await.touch(sid, Instant::now());
        Ok(())
    }
}

impl Drop for MemoryBroker {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}
