//! Transports move raw payloads between the bus and a pub/sub backend.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::InMemoryTransport;
#[cfg(feature = "redis")]
pub use self::redis::RedisTransport;

use crate::error::BusResult;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// A payload received on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub channel: String,
    pub payload: String,
}

impl WireMessage {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// Inbound messages for every channel the transport is subscribed to.
pub type WireStream = Pin<Box<dyn Stream<Item = WireMessage> + Send>>;

/// Channel-based pub/sub backend.
///
/// Delivery is at-most-once: a message published while nobody is subscribed
/// to its channel is gone.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the inbound stream. Called once, when the bus starts.
    async fn open(&self) -> BusResult<WireStream>;

    async fn publish(&self, channel: &str, payload: String) -> BusResult<()>;

    /// Start receiving `channel` on the inbound stream.
    async fn subscribe(&self, channel: &str) -> BusResult<()>;

    async fn unsubscribe(&self, channel: &str) -> BusResult<()>;

    /// Release connections. The inbound stream ends afterwards.
    async fn close(&self) -> BusResult<()>;

    async fn health_check(&self) -> BusResult<()> {
        Ok(())
    }

    /// Used in logs and metric labels.
    fn name(&self) -> &'static str;
}
