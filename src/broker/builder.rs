//! Backend selection from configuration

use std::sync::Arc;

use super::config::Adapter;
use super::legacy::LegacyBroker;
use super::traits::{Broadcaster, Broker};
use crate::config::Config;
use crate::error::Result;
use crate::memory::MemoryBroker;

/// Create the broker selected by `config.broker.adapter`
///
/// The broker is not started. Fails with [`BrokerError::AdapterUnavailable`]
/// when the adapter's cargo feature is disabled.
pub fn build_broker(config: &Config, broadcaster: Arc<dyn Broadcaster>) -> Result<Arc<dyn Broker>> {
    config.broker.validate()?;

    let broker: Arc<dyn Broker> = match config.broker.adapter {
        Adapter::Memory => Arc::new(MemoryBroker::new(broadcaster, config.broker.clone())),
        Adapter::Legacy => Arc::new(LegacyBroker::new(broadcaster)),
        Adapter::Redis => redis_broker(config, broadcaster)?,
        Adapter::Nats => nats_broker(config, broadcaster)?,
    };

    tracing::debug!(adapter = %config.broker.adapter, "Broker created");
    Ok(broker)
}

#[cfg(feature = "redis")]
fn redis_broker(config: &Config, broadcaster: Arc<dyn Broadcaster>) -> Result<Arc<dyn Broker>> {
    Ok(Arc::new(crate::redis::RedisBroker::new(
        broadcaster,
        config.broker.clone(),
        config.redis.clone(),
    )))
}

#[cfg(not(feature = "redis"))]
fn redis_broker(_config: &Config, _broadcaster: Arc<dyn Broadcaster>) -> Result<Arc<dyn Broker>> {
    Err(crate::error::BrokerError::AdapterUnavailable(
        Adapter::Redis.to_string(),
    ))
}

#[cfg(feature = "nats")]
fn nats_broker(config: &Config, broadcaster: Arc<dyn Broadcaster>) -> Result<Arc<dyn Broker>> {
    Ok(Arc::new(crate::nats::NatsBroker::new(
        broadcaster,
        config.broker.clone(),
        config.nats.clone(),
    )))
}

#[cfg(not(feature = "nats"))]
fn nats_broker(_config: &Config, _broadcaster: Arc<dyn Broadcaster>) -> Result<Arc<dyn Broker>> {
    Err(crate::error::BrokerError::AdapterUnavailable(
        Adapter::Nats.to_string(),
    ))
}
