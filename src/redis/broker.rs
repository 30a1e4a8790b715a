//! Redis Streams broker implementation

use std::sync::Arc;

use ::redis::aio::ConnectionManager;
use ::redis::streams::StreamRangeReply;
use ::redis::Script;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::RwLock;

use super::config::RedisConfig;
use crate::broker::epoch::{generate_epoch, EpochCell};
use crate::broker::{
    Broadcaster, Broker, BrokerConfig, Cacheable, PresenceEvent, PresenceInfo,
    PresenceInfoOptions, StreamsTracker,
};
use crate::error::{BrokerError, Result};
use crate::message::{RemoteCommandMessage, StreamMessage};

/// Appends a message to a stream history in one round trip.
///
/// KEYS[1] - stream log, KEYS[2] - position counter, KEYS[3] - timestamp index
/// ARGV[1] - payload, ARGV[2] - history limit (0 = none), ARGV[3] - history ttl
const ADD_TO_STREAM_SCRIPT: &str = r#"
local pos = redis.call("incr", KEYS[2])
redis.call("expire", KEYS[2], tonumber(ARGV[3]) * 10)

local maxlen = tonumber(ARGV[2])

if maxlen > 0 then
  redis.call("xadd", KEYS[1], "MAXLEN", maxlen, pos, "d", ARGV[1])
  redis.call("xadd", KEYS[3], "MAXLEN", maxlen, "*", "pos", pos)
else
  redis.call("xadd", KEYS[1], pos, "d", ARGV[1])
  redis.call("xadd", KEYS[3], "*", "pos", pos)
end

redis.call("expire", KEYS[1], ARGV[3])
redis.call("expire", KEYS[3], ARGV[3])

return pos
"#;

/// Key layout under the configured prefix
#[derive(Debug, Clone)]
struct Keys {
    prefix: String,
}

impl Keys {
    fn stream(&self, stream: &str) -> String {
        format!("{}:s:{}", self.prefix, stream)
    }

    fn position(&self, stream: &str) -> String {
        format!("{}:spos:{}", self.prefix, stream)
    }

    fn timestamps(&self, stream: &str) -> String {
        format!("{}:sts:{}", self.prefix, stream)
    }

    fn session(&self, sid: &str) -> String {
        format!("{}:se:{}", self.prefix, sid)
    }

    fn epoch(&self) -> String {
        format!("{}:e", self.prefix)
    }

    fn all(&self) -> String {
        format!("{}:*", self.prefix)
    }
}

/// Broker keeping history and sessions in Redis, shared by every instance
///
/// Offsets are assigned by Redis itself, so concurrent producers on different
/// instances never hand out the same offset twice.
pub struct RedisBroker {
    broadcaster: Arc<dyn Broadcaster>,
    config: BrokerConfig,
    redis_config: RedisConfig,
    tracker: StreamsTracker,
    keys: Keys,

    /// Connection handle; `None` until started and after shutdown
    client: RwLock<Option<ConnectionManager>>,

    epoch: EpochCell,
    add_script: Script,
}

impl RedisBroker {
    /// Create a broker; no connection is made until [`Broker::start`]
    pub fn new(
        broadcaster: Arc<dyn Broadcaster>,
        config: BrokerConfig,
        redis_config: RedisConfig,
    ) -> Self {
        let keys = Keys {
            prefix: redis_config.key_prefix.clone(),
        };

        Self {
            broadcaster,
            config,
            redis_config,
            tracker: StreamsTracker::new(),
            keys,
            client: RwLock::new(None),
            epoch: EpochCell::default(),
            add_script: Script::new(ADD_TO_STREAM_SCRIPT),
        }
    }

    /// Current epoch
    pub fn epoch(&self) -> String {
        self.epoch.get()
    }

    /// Overwrite the shared epoch
    ///
    /// Every outstanding client offset becomes unusable.
    pub async fn set_epoch(&self, epoch: impl Into<String>) -> Result<()> {
        let epoch = epoch.into();
        let mut conn = self.connection().await?;

        let _: () = ::redis::cmd("SET")
            .arg(self.keys.epoch())
            .arg(&epoch)
            .arg("EX")
            .arg(self.config.epoch_ttl().as_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::backend("failed to set epoch", e))?;

        self.epoch.set(epoch);
        Ok(())
    }

    /// Delete every key under the broker namespace and start a new epoch
    pub async fn reset(&self) -> Result<()> {
        let mut conn = self.connection().await?;

        let keys: Vec<String> = ::redis::cmd("KEYS")
            .arg(self.keys.all())
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::backend("failed to retrieve keys", e))?;

        if !keys.is_empty() {
            let _: u64 = ::redis::cmd("DEL")
                .arg(&keys)
                .query_async(&mut conn)
                .await
                .map_err(|e| BrokerError::backend("failed to delete keys", e))?;
        }

        let epoch = self.establish_epoch(&mut conn).await?;
        self.epoch.set(epoch.clone());

        tracing::info!(
            prefix = %self.keys.prefix,
            deleted = keys.len(),
            epoch = %epoch,
            "Redis broker reset"
        );

        Ok(())
    }

    /// Clone the connection handle out of its guard
    ///
    /// The guard is released before any network call is made.
    async fn connection(&self) -> Result<ConnectionManager> {
        self.client.read().await.clone().ok_or(BrokerError::NotStarted)
    }

    /// Propose a new epoch unless one is already stored, then read the winner
    ///
    /// Runs as a single MULTI/EXEC, so the read always observes a fully
    /// initialized key (value and TTL).
    async fn establish_epoch(&self, conn: &mut ConnectionManager) -> Result<String> {
        let proposed = generate_epoch();
        let key = self.keys.epoch();

        let (epoch,): (String,) = ::redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&key)
            .arg(&proposed)
            .arg("NX")
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(self.config.epoch_ttl().as_secs())
            .ignore()
            .cmd("GET")
            .arg(&key)
            .query_async(conn)
            .await
            .map_err(|e| BrokerError::backend("failed to calculate epoch", e))?;

        Ok(epoch)
    }

    async fn add(&self, stream: &str, data: &[u8]) -> Result<u64> {
        let mut conn = self.connection().await?;

        let offset: u64 = self
            .add_script
            .key(self.keys.stream(stream))
            .key(self.keys.position(stream))
            .key(self.keys.timestamps(stream))
            .arg(data)
            .arg(self.config.history_limit)
            .arg(self.config.history_ttl_secs())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| BrokerError::backend("failed to add message to Redis stream", e))?;

        Ok(offset)
    }

    async fn key_exists(&self, conn: &mut ConnectionManager, key: &str) -> Result<bool> {
        ::redis::cmd("EXISTS")
            .arg(key)
            .query_async(conn)
            .await
            .map_err(|e| BrokerError::backend("failed to check key existence", e))
    }

    /// Oldest and newest retained offsets, `None` if the log has no entries
    ///
    /// Fails with [`BrokerError::StreamNotFound`] when the log key is missing.
    async fn bounds(
        &self,
        conn: &mut ConnectionManager,
        stream: &str,
    ) -> Result<Option<(u64, u64)>> {
        let key = self.keys.stream(stream);

        let (exists, first, last): (bool, StreamRangeReply, StreamRangeReply) = ::redis::pipe()
            .atomic()
            .cmd("EXISTS")
            .arg(&key)
            .cmd("XRANGE")
            .arg(&key)
            .arg("-")
            .arg("+")
            .arg("COUNT")
            .arg(1)
            .cmd("XREVRANGE")
            .arg(&key)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(1)
            .query_async(conn)
            .await
            .map_err(|e| BrokerError::backend("failed to get history bounds from Redis", e))?;

        if !exists {
            return Err(BrokerError::StreamNotFound(stream.to_string()));
        }

        match (first.ids.first(), last.ids.first()) {
            (Some(low), Some(latest)) => Ok(Some((parse_offset(&low.id)?, parse_offset(&latest.id)?))),
            _ => Ok(None),
        }
    }

    /// Entries with offset greater than `after`, no position checks
    async fn read_range(
        &self,
        conn: &mut ConnectionManager,
        stream: &str,
        epoch: &str,
        after: u64,
    ) -> Result<Vec<StreamMessage>> {
        let reply: StreamRangeReply = ::redis::cmd("XRANGE")
            .arg(self.keys.stream(stream))
            .arg(format!("({after}"))
            .arg("+")
            .query_async(conn)
            .await
            .map_err(|e| BrokerError::backend("failed to get history from Redis", e))?;

        let mut history = Vec::with_capacity(reply.ids.len());

        for entry in &reply.ids {
            let position = parse_offset(&entry.id)?;
            let data: Vec<u8> = entry.get("d").unwrap_or_default();

            history.push(StreamMessage::from_history(
                stream,
                Bytes::from(data),
                position,
                epoch,
            ));
        }

        Ok(history)
    }
}

/// Offset encoded in a stream entry id (`<offset>-0`)
fn parse_offset(id: &str) -> Result<u64> {
    let head = id.split_once('-').map_or(id, |(head, _)| head);

    head.parse().map_err(|e| {
        BrokerError::backend("failed to parse offset from Redis stream id", e)
    })
}

#[async_trait]
impl Broker for RedisBroker {
    async fn start(&self) -> Result<()> {
        let client = ::redis::Client::open(self.redis_config.url.as_str())
            .map_err(|e| BrokerError::backend("invalid Redis URL", e))?;

        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(|e| BrokerError::backend("failed to connect to Redis", e))?;

        let epoch = self.establish_epoch(&mut conn).await?;
        self.epoch.set(epoch.clone());

        *self.client.write().await = Some(conn);

        tracing::info!(
            host = %self.redis_config.hostname(),
            epoch = %epoch,
            "Redis broker started"
        );

        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if self.client.write().await.take().is_some() {
            tracing::debug!("Redis broker connection closed");
        }

        Ok(())
    }

    fn announce(&self) -> String {
        format!(
            "Using Redis broker at {} (history limit: {}, history ttl: {}s, sessions ttl: {}s)",
            self.redis_config.hostname(),
            self.config.history_limit,
            self.config.history_ttl_secs(),
            self.config.sessions_ttl_secs(),
        )
    }

    async fn handle_broadcast(&self, mut msg: StreamMessage) -> Result<()> {
        if msg.is_transient() {
            self.broadcaster.broadcast(&msg);
            return Ok(());
        }

        let offset = match self.add(&msg.stream, &msg.data).await {
            Ok(offset) => offset,
            Err(e) => {
                tracing::error!(stream = %msg.stream, error = %e, "Failed to add message to history");
                return Err(e);
            }
        };

        msg.offset = offset;
        msg.epoch = self.epoch.get();

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
        stream: &str,
        epoch: &str,
        offset: u64,
    ) -> Result<Vec<StreamMessage>> {
        let mut conn = self.connection().await?;

        if !self.epoch.matches(epoch) {
            return Err(BrokerError::EpochMismatch {
                requested: epoch.to_string(),
                current: self.epoch.get(),
            });
        }

        let Some((low, latest)) = self.bounds(&mut conn, stream).await? else {
            return Err(BrokerError::StreamEmpty(stream.to_string()));
        };

        if low > offset {
            return Err(BrokerError::OffsetUnavailable {
                requested: offset,
                lowest: low,
            });
        }

        if offset > latest {
            return Err(BrokerError::OffsetAhead {
                requested: offset,
                latest,
            });
        }

        self.read_range(&mut conn, stream, epoch, offset).await
    }

    async fn history_since(&self, stream: &str, since: i64) -> Result<Vec<StreamMessage>> {
        let mut conn = self.connection().await?;
        let key = self.keys.timestamps(stream);

        if !self.key_exists(&mut conn, &key).await? {
            return Ok(Vec::new());
        }

        // Entry ids of the timestamp index are milliseconds
        let start = since.max(0).saturating_mul(1000);

        let reply: StreamRangeReply = ::redis::cmd("XRANGE")
            .arg(&key)
            .arg(start)
            .arg("+")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::backend("failed to get history from Redis", e))?;

        let Some(first) = reply.ids.first() else {
            return Ok(Vec::new());
        };

        let position: u64 = first.get("pos").ok_or_else(|| {
            BrokerError::backend(
                "failed to parse offset from Redis response",
                format!("timestamp index entry {} has no position", first.id),
            )
        })?;

        let epoch = self.epoch.get();
        self.read_range(&mut conn, stream, &epoch, position.saturating_sub(1))
            .await
    }

    async fn commit_session(&self, sid: &str, session: &dyn Cacheable) -> Result<()> {
        let mut conn = self.connection().await?;
        let data = session
            .to_cache_entry()
            .map_err(BrokerError::Serialization)?;

        let _: () = ::redis::cmd("SET")
            .arg(self.keys.session(sid))
            .arg(&data[..])
            .arg("EX")
            .arg(self.config.sessions_ttl_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::backend("failed to store session in Redis", e))?;

        Ok(())
    }

    async fn restore_session(&self, sid: &str) -> Result<Option<Bytes>> {
        let mut conn = self.connection().await?;

        let data: Option<Vec<u8>> = ::redis::cmd("GET")
            .arg(self.keys.session(sid))
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::backend("failed to restore session from Redis", e))?;

        Ok(data.map(Bytes::from))
    }

    async fn finish_session(&self, sid: &str) -> Result<()> {
        let mut conn = self.connection().await?;

        let _: bool = ::redis::cmd("EXPIRE")
            .arg(self.keys.session(sid))
            .arg(self.config.sessions_ttl_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::backend("failed to refresh session in Redis", e))?;

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

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::broker::testing::RecordingBroadcaster;
    use crate::broker::unix_now;

    /// Started broker in a private namespace, `None` when REDIS_URL is not set
    async fn redis_broker(
        config: BrokerConfig,
        prefix: &str,
    ) -> Option<(RedisBroker, Arc<RecordingBroadcaster>)> {
        let url = std::env::var("REDIS_URL").ok()?;
        let redis_config = RedisConfig::default().url(url).key_prefix(prefix);
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let broker = RedisBroker::new(broadcaster.clone(), config, redis_config);

        broker.start().await.unwrap();
        Some((broker, broadcaster))
    }

    fn test_prefix() -> String {
        format!("$test:{}", generate_epoch())
    }

    async fn publish(broker: &RedisBroker, stream: &str, payloads: &[&'static str]) {
        for payload in payloads {
            assert_ok!(broker.handle_broadcast(StreamMessage::new(stream, *payload)).await);
        }
    }

    fn data(messages: &[StreamMessage]) -> Vec<(u64, Bytes)> {
        messages.iter().map(|m| (m.offset, m.data.clone())).collect()
    }

    #[test]
    fn test_keys_layout() {
        let keys = Keys {
            prefix: "$ac".to_string(),
        };

        assert_eq!(keys.stream("chat"), "$ac:s:chat");
        assert_eq!(keys.position("chat"), "$ac:spos:chat");
        assert_eq!(keys.timestamps("chat"), "$ac:sts:chat");
        assert_eq!(keys.session("sid"), "$ac:se:sid");
        assert_eq!(keys.epoch(), "$ac:e");
        assert_eq!(keys.all(), "$ac:*");
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("42-0").unwrap(), 42);
        assert_eq!(parse_offset("7").unwrap(), 7);
        assert!(parse_offset("abc-0").is_err());
    }

    #[tokio::test]
    async fn test_not_started() {
        let broker = RedisBroker::new(
            Arc::new(RecordingBroadcaster::default()),
            BrokerConfig::default(),
            RedisConfig::default(),
        );

        let err = assert_err!(broker.history_from("s", "e", 0).await);
        assert!(matches!(err, BrokerError::NotStarted));
        let err = assert_err!(broker.restore_session("s").await);
        assert!(matches!(err, BrokerError::NotStarted));
        let err = assert_err!(broker.handle_broadcast(StreamMessage::new("s", "x")).await);
        assert!(matches!(err, BrokerError::NotStarted));

        // Shutdown without a successful start
        assert_ok!(broker.shutdown().await);
    }

    #[tokio::test]
    async fn test_announce() {
        let broker = RedisBroker::new(
            Arc::new(RecordingBroadcaster::default()),
            BrokerConfig::default(),
            RedisConfig::default().url("redis://:pass@redis.local:6379/0"),
        );

        let announce = broker.announce();
        assert!(announce.contains("redis.local:6379"));
        assert!(!announce.contains("pass"));
    }

    #[tokio::test]
    async fn test_offsets_and_history_from() {
        let Some((broker, broadcaster)) =
            redis_broker(BrokerConfig::default(), &test_prefix()).await
        else {
            return;
        };

        publish(&broker, "test", &["a", "b", "c", "d", "e"]).await;

        let offsets: Vec<u64> = broadcaster.broadcasts().iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![1, 2, 3, 4, 5]);

        let history = assert_ok!(broker.history_from("test", &broker.epoch(), 2).await);
        assert_eq!(
            data(&history),
            vec![
                (3, Bytes::from("c")),
                (4, Bytes::from("d")),
                (5, Bytes::from("e"))
            ]
        );

        let err = assert_err!(broker.history_from("test", "unknown", 2).await);
        assert!(matches!(err, BrokerError::EpochMismatch { .. }));

        let err = assert_err!(broker.history_from("missing", &broker.epoch(), 0).await);
        assert!(matches!(err, BrokerError::StreamNotFound(_)));

        assert_ok!(broker.reset().await);
        assert_ok!(broker.shutdown().await);
    }

    #[tokio::test]
    async fn test_history_limit_and_trimmed_offset() {
        let config = BrokerConfig::default().history_limit(2);
        let Some((broker, _)) = redis_broker(config, &test_prefix()).await else {
            return;
        };

        publish(&broker, "test", &["a", "b", "c"]).await;

        let history = assert_ok!(broker.history_since("test", unix_now() - 10).await);
        assert_eq!(
            data(&history),
            vec![(2, Bytes::from("b")), (3, Bytes::from("c"))]
        );

        let err = assert_err!(broker.history_from("test", &broker.epoch(), 0).await);
        assert!(matches!(
            err,
            BrokerError::OffsetUnavailable {
                requested: 0,
                lowest: 2
            }
        ));

        assert_ok!(broker.reset().await);
    }

    #[tokio::test]
    async fn test_history_from_outside_retained_range() {
        let config = BrokerConfig::default().history_limit(2);
        let Some((broker, _)) = redis_broker(config, &test_prefix()).await else {
            return;
        };

        publish(&broker, "test", &["a", "b", "c"]).await;
        let epoch = broker.epoch();

        let err = assert_err!(broker.history_from("test", &epoch, 1).await);
        assert!(matches!(
            err,
            BrokerError::OffsetUnavailable {
                requested: 1,
                lowest: 2
            }
        ));

        let err = assert_err!(broker.history_from("test", &epoch, 9).await);
        assert!(matches!(
            err,
            BrokerError::OffsetAhead {
                requested: 9,
                latest: 3
            }
        ));
        assert!(err.is_stale());

        assert!(assert_ok!(broker.history_from("test", &epoch, 3).await).is_empty());

        let history = assert_ok!(broker.history_from("test", &epoch, 2).await);
        assert_eq!(data(&history), vec![(3, Bytes::from("c"))]);

        assert_ok!(broker.reset().await);
    }

    #[tokio::test]
    async fn test_presence_not_supported() {
        let broker = RedisBroker::new(
            Arc::new(RecordingBroadcaster::default()),
            BrokerConfig::default(),
            RedisConfig::default(),
        );

        let err = assert_err!(broker.presence_add("chat", "s1", "u1", Value::Null).await);
        assert!(matches!(err, BrokerError::PresenceNotSupported));
        assert_err!(broker.presence_remove("chat", "s1").await);
        assert_err!(broker.presence_info("chat", PresenceInfoOptions::default()).await);
        assert_ok!(broker.touch_presence("s1").await);
    }

    #[tokio::test]
    async fn test_history_since_expiration() {
        let config = BrokerConfig::default().history_ttl(Duration::from_secs(1));
        let Some((broker, _)) = redis_broker(config, &test_prefix()).await else {
            return;
        };

        let start = unix_now() - 10;

        publish(&broker, "test", &["a", "b"]).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        publish(&broker, "test", &["c", "d"]).await;

        let history = assert_ok!(broker.history_since("test", start).await);
        assert_eq!(
            data(&history),
            vec![(3, Bytes::from("c")), (4, Bytes::from("d"))]
        );

        let history = assert_ok!(broker.history_since("missing", start).await);
        assert!(history.is_empty());

        assert_ok!(broker.reset().await);
    }

    #[tokio::test]
    async fn test_sessions() {
        let config = BrokerConfig::default().sessions_ttl(Duration::from_secs(1));
        let Some((broker, _)) = redis_broker(config, &test_prefix()).await else {
            return;
        };

        assert_ok!(broker.commit_session("s1", &"X").await);
        assert_eq!(
            assert_ok!(broker.restore_session("s1").await),
            Some(Bytes::from("X"))
        );
        assert_eq!(assert_ok!(broker.restore_session("s2").await), None);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(assert_ok!(broker.restore_session("s1").await), None);

        assert_ok!(broker.reset().await);
    }

    #[tokio::test]
    async fn test_shared_epoch_and_concurrent_appends() {
        let prefix = test_prefix();
        let Some((first, first_out)) = redis_broker(BrokerConfig::default(), &prefix).await
        else {
            return;
        };
        let Some((second, second_out)) = redis_broker(BrokerConfig::default(), &prefix).await
        else {
            return;
        };

        assert_eq!(first.epoch(), second.epoch());

        let first = Arc::new(first);
        let second = Arc::new(second);
        let mut handles = Vec::new();

        for broker in [Arc::clone(&first), Arc::clone(&second)] {
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    broker
                        .handle_broadcast(StreamMessage::new("shared", "x"))
                        .await
                        .unwrap();
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let mut offsets: Vec<u64> = first_out
            .broadcasts()
            .iter()
            .chain(second_out.broadcasts().iter())
            .map(|m| m.offset)
            .collect();
        offsets.sort_unstable();

        assert_eq!(offsets, (1..=100).collect::<Vec<_>>());

        assert_ok!(first.reset().await);
    }

    #[tokio::test]
    async fn test_reset_changes_epoch() {
        let Some((broker, _)) = redis_broker(BrokerConfig::default(), &test_prefix()).await
        else {
            return;
        };

        publish(&broker, "test", &["a"]).await;
        let before = broker.epoch();

        assert_ok!(broker.set_epoch("pinned").await);
        assert_eq!(broker.epoch(), "pinned");

        assert_ok!(broker.reset().await);
        assert_ne!(broker.epoch(), "pinned");

        let err = assert_err!(broker.history_from("test", &before, 0).await);
        assert!(err.is_stale());
    }
}
