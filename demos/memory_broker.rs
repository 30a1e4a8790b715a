//! In-memory broker walkthrough
//!
//! Run with: cargo run --example memory_broker [ADAPTER]
//!
//! Publishes a few messages to a stream, then replays them the way a
//! reconnecting client would: by offset within the current epoch, and by
//! timestamp. Finally commits and restores a session snapshot.
//!
//! ADAPTER defaults to `memory`. `redis` and `nats` connect to the servers in
//! REDIS_URL / NATS_URL (or the defaults).

use std::sync::Arc;

use cable_broker::{
    build_broker, Adapter, Broadcaster, Config, RemoteCommandMessage, StreamMessage,
};

/// Prints everything the broker fans out
struct PrintBroadcaster;

impl Broadcaster for PrintBroadcaster {
    fn broadcast(&self, msg: &StreamMessage) {
        tracing::info!(
            stream = %msg.stream,
            offset = msg.offset,
            epoch = %msg.epoch,
            data = %String::from_utf8_lossy(&msg.data),
            "Broadcast"
        );
    }

    fn broadcast_command(&self, msg: &RemoteCommandMessage) {
        tracing::info!(command = %msg.command, "Command");
    }

    fn subscribe(&self, stream: &str) {
        tracing::info!(stream = %stream, "Subscribed");
    }

    fn unsubscribe(&self, stream: &str) {
        tracing::info!(stream = %stream, "Unsubscribed");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cable_broker=debug".parse()?)
                .add_directive("memory_broker=info".parse()?),
        )
        .init();

    let adapter: Adapter = match std::env::args().nth(1) {
        Some(name) => name.parse()?,
        None => Adapter::Memory,
    };

    let mut config = Config::default();
    config.broker = config.broker.adapter(adapter).history_limit(10);

    if let Ok(url) = std::env::var("REDIS_URL") {
        config.redis = config.redis.url(url);
    }
    if let Ok(servers) = std::env::var("NATS_URL") {
        config.nats = config.nats.servers(servers);
    }

    let broker = build_broker(&config, Arc::new(PrintBroadcaster))?;
    broker.start().await?;
    println!("{}", broker.announce());

    let started_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs() as i64;

    broker.subscribe("chat");

    for text in ["hello", "how are you?", "bye"] {
        broker
            .handle_broadcast(StreamMessage::new("chat", text))
            .await?;
    }

    // A client that saw offset 1 asks for the rest
    let since = broker.history_since("chat", started_at).await?;
    let epoch = since.first().map(|m| m.epoch.clone()).unwrap_or_default();
    println!("history since start: {} message(s)", since.len());

    match broker.history_from("chat", &epoch, 1).await {
        Ok(missed) => {
            for msg in missed {
                println!("replay #{}: {}", msg.offset, String::from_utf8_lossy(&msg.data));
            }
        }
        Err(e) => println!("cannot replay from offset 1: {e}"),
    }

    broker.commit_session("session-1", &"{\"user\":\"jack\"}").await?;
    broker.finish_session("session-1").await?;

    if let Some(state) = broker.restore_session("session-1").await? {
        println!("restored session: {}", String::from_utf8_lossy(&state));
    }

    broker.unsubscribe("chat");
    broker.shutdown().await?;

    Ok(())
}
