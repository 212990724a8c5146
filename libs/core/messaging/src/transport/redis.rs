use super::{Transport, WireMessage, WireStream};
use crate::error::{BusError, BusResult};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::{ConnectionManager, PubSubSink};
use redis::{AsyncCommands, Client};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Redis Pub/Sub transport.
///
/// Publishing goes through the shared [`ConnectionManager`]. Receiving uses a
/// dedicated pub/sub connection opened from `client`, split into a sink for
/// SUBSCRIBE/UNSUBSCRIBE and the message stream handed to the bus.
pub struct RedisTransport {
    client: Client,
    publisher: ConnectionManager,
    sink: Mutex<Option<PubSubSink>>,
}

impl RedisTransport {
    pub fn new(client: Client, publisher: ConnectionManager) -> Self {
        Self {
            client,
            publisher,
            sink: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transport for RedisTransport {
    async fn open(&self) -> BusResult<WireStream> {
        let mut sink = self.sink.lock().await;
        if sink.is_some() {
            return Err(BusError::transport("redis pub/sub connection is already open"));
        }

        let pubsub = self.client.get_async_pubsub().await?;
        let (pubsub_sink, stream) = pubsub.split();
        *sink = Some(pubsub_sink);

        info!("Opened Redis pub/sub connection");

        let messages = stream.filter_map(|msg| async move {
            let channel = msg.get_channel_name().to_string();
            match msg.get_payload::<String>() {
                Ok(payload) => Some(WireMessage { channel, payload }),
                Err(e) => {
                    warn!(channel = %channel, error = %e, "Dropping non-text pub/sub payload");
                    None
                }
            }
        });

        Ok(Box::pin(messages))
    }

    async fn publish(&self, channel: &str, payload: String) -> BusResult<()> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn.publish(channel, payload).await?;
        debug!(channel, receivers, "Published to Redis channel");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> BusResult<()> {
        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(BusError::Closed)?;
        sink.subscribe(channel).await?;
        debug!(channel, "Subscribed to Redis channel");
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> BusResult<()> {
        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(BusError::Closed)?;
        sink.unsubscribe(channel).await?;
        debug!(channel, "Unsubscribed from Redis channel");
        Ok(())
    }

    async fn close(&self) -> BusResult<()> {
        // Dropping the sink (and the stream held by the dispatcher) closes
        // the pub/sub connection.
        if self.sink.lock().await.take().is_some() {
            info!("Closed Redis pub/sub connection");
        }
        Ok(())
    }

    async fn health_check(&self) -> BusResult<()> {
        let mut conn = self.publisher.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(BusError::transport(format!(
                "unexpected PING response: {pong}"
            )));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
