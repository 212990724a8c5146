use super::{Transport, WireMessage, WireStream};
use crate::error::{BusError, BusResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// In-process transport with Redis Pub/Sub semantics.
///
/// Only subscribed channels are delivered. Clones share state, so a test can
/// keep a handle to inject raw payloads or make publishing fail.
///
/// Meant for tests: every published message is kept for [`Self::published`]
/// until [`Self::take_published`] drains it, so memory grows with traffic.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<State>,
}

#[derive(Default)]
struct State {
    channels: Mutex<HashSet<String>>,
    sender: Mutex<Option<mpsc::UnboundedSender<WireMessage>>>,
    published: Mutex<Vec<WireMessage>>,
    fail_publish: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail until reset.
    pub fn set_fail_publish(&self, fail: bool) {
        self.state.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Deliver a raw payload as if it arrived from the backend.
    ///
    /// Returns `false` when nobody is subscribed to `channel`.
    pub fn inject(&self, channel: &str, payload: impl Into<String>) -> bool {
        self.deliver(WireMessage::new(channel, payload))
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<WireMessage> {
        lock(&self.state.published).clone()
    }

    /// Drain the published log.
    pub fn take_published(&self) -> Vec<WireMessage> {
        std::mem::take(&mut *lock(&self.state.published))
    }

    /// End the inbound stream as if the backend connection dropped.
    ///
    /// Unlike [`Transport::close`], subscriptions are left in place.
    pub fn disconnect(&self) {
        lock(&self.state.sender).take();
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        lock(&self.state.channels).contains(channel)
    }

    fn deliver(&self, message: WireMessage) -> bool {
        if !self.is_subscribed(&message.channel) {
            return false;
        }
        match lock(&self.state.sender).as_ref() {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn open(&self) -> BusResult<WireStream> {
        let mut sender = lock(&self.state.sender);
        if sender.is_some() {
            return Err(BusError::transport("in-memory transport is already open"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *sender = Some(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn publish(&self, channel: &str, payload: String) -> BusResult<()> {
        if self.state.fail_publish.load(Ordering::SeqCst) {
            return Err(BusError::transport("simulated publish failure"));
        }
        if lock(&self.state.sender).is_none() {
            return Err(BusError::Closed);
        }

        let message = WireMessage::new(channel, payload);
        lock(&self.state.published).push(message.clone());
        self.deliver(message);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> BusResult<()> {
        lock(&self.state.channels).insert(channel.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> BusResult<()> {
        lock(&self.state.channels).remove(channel);
        Ok(())
    }

    async fn close(&self) -> BusResult<()> {
        lock(&self.state.sender).take();
        lock(&self.state.channels).clear();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
