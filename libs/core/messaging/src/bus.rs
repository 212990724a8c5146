//! The event bus: subscription registry plus dispatch loop.

use crate::envelope::{Envelope, NewEnvelope};
use crate::error::{BusError, BusResult};
use crate::handler::EventHandler;
use crate::metrics::BusMetrics;
use crate::transport::{Transport, WireMessage, WireStream};
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Identifies one handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Registration {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
}

type HandlerTable = Arc<Mutex<HashMap<String, Vec<Registration>>>>;

/// Publish/subscribe broker over a [`Transport`].
///
/// Cheap to clone; clones share the same registry and dispatch loop. Call
/// [`EventBus::shutdown`] to stop dispatching and release the transport.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    handlers: HandlerTable,
    next_id: AtomicU64,
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    /// Flips to `true` when the inbound stream ends outside of `shutdown`
    stream_ended: watch::Receiver<bool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    metrics: BusMetrics,
}

impl EventBus {
    /// Open the transport and spawn the dispatch loop.
    pub async fn start(transport: Arc<dyn Transport>) -> BusResult<Self> {
        let stream = transport.open().await?;

        let handlers = HandlerTable::default();
        let metrics = BusMetrics::new(transport.name());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ended_tx, stream_ended) = watch::channel(false);

        let dispatcher = Dispatcher {
            handlers: handlers.clone(),
            metrics: metrics.clone(),
            ended_tx,
        };
        let handle = tokio::spawn(dispatcher.run(stream, shutdown_rx));

        info!(transport = transport.name(), "Event bus started");

        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                handlers,
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                shutdown_tx,
                stream_ended,
                dispatcher: Mutex::new(Some(handle)),
                metrics,
            }),
        })
    }

    /// Stamp and send an envelope on the channel named by its event type.
    ///
    /// Resolves once the transport accepts the message, not once handlers
    /// have run.
    #[instrument(
        skip(self, envelope),
        fields(event_type = %envelope.event_type, correlation_id = %envelope.correlation_id)
    )]
    pub async fn publish(&self, envelope: NewEnvelope) -> BusResult<Envelope> {
        self.ensure_open()?;

        let envelope = envelope.stamp();
        let payload = envelope.encode()?;

        if let Err(e) = self
            .inner
            .transport
            .publish(&envelope.event_type, payload)
            .await
        {
            self.inner.metrics.publish_failed(&envelope.event_type);
            return Err(e);
        }

        self.inner.metrics.published(&envelope.event_type);
        debug!(event_id = %envelope.id, "Published event");
        Ok(envelope)
    }

    /// Register `handler` for every future envelope of `event_type`.
    ///
    /// The first registration for a type subscribes the transport channel;
    /// later ones share it.
    #[instrument(skip(self, handler), fields(handler = handler.name()))]
    pub async fn subscribe(
        &self,
        event_type: &str,
        handler: Arc<dyn EventHandler>,
    ) -> BusResult<Subscription> {
        self.ensure_open()?;

        let mut handlers = self.inner.handlers.lock().await;

        let channel_open = handlers.get(event_type).is_some_and(|list| !list.is_empty());
        if !channel_open {
            self.inner.transport.subscribe(event_type).await?;
            info!("Opened channel");
        }

        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        handlers
            .entry(event_type.to_string())
            .or_default()
            .push(Registration { id, handler });

        debug!(subscription = %id, "Handler subscribed");

        Ok(Subscription {
            id,
            event_type: event_type.to_string(),
            bus: Arc::downgrade(&self.inner),
        })
    }

    /// Remove one handler (`Some(id)`) or every handler (`None`) for `event_type`.
    ///
    /// The channel is released once no handler is left. Returns whether
    /// anything was removed.
    #[instrument(skip(self))]
    pub async fn unsubscribe(
        &self,
        event_type: &str,
        id: Option<SubscriptionId>,
    ) -> BusResult<bool> {
        self.inner.unsubscribe(event_type, id).await
    }

    pub async fn handler_count(&self, event_type: &str) -> usize {
        self.inner
            .handlers
            .lock()
            .await
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Event types with at least one handler, sorted.
    pub async fn subscribed_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.inner.handlers.lock().await.keys().cloned().collect();
        types.sort();
        types
    }

    pub async fn health_check(&self) -> BusResult<()> {
        self.ensure_open()?;
        self.inner.transport.health_check().await
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Whether the transport's inbound stream ended and nothing is dispatched anymore.
    pub fn is_disconnected(&self) -> bool {
        *self.inner.stream_ended.borrow()
    }

    /// Resolves once the inbound stream ends without [`EventBus::shutdown`].
    ///
    /// The bus cannot recover from this; owners should treat it as fatal.
    /// Never resolves for a bus that is shut down normally.
    pub async fn disconnected(&self) {
        let mut ended = self.inner.stream_ended.clone();
        let reported = ended.wait_for(|ended| *ended).await.is_ok();
        if !reported {
            std::future::pending::<()>().await;
        }
    }

    /// Stop dispatching, drop every handler and close the transport.
    ///
    /// Envelopes still in flight may be lost. Calling this again is a no-op.
    pub async fn shutdown(&self) -> BusResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Shutting down event bus");
        let _ = self.inner.shutdown_tx.send(true);

        if let Some(handle) = self.inner.dispatcher.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatch loop terminated abnormally");
            }
        }

        self.inner.handlers.lock().await.clear();
        self.inner.transport.close().await?;

        info!("Event bus stopped");
        Ok(())
    }

    fn ensure_open(&self) -> BusResult<()> {
        if self.is_closed() {
            Err(BusError::Closed)
        } else if self.is_disconnected() {
            Err(BusError::Disconnected)
        } else {
            Ok(())
        }
    }
}

impl Inner {
    async fn unsubscribe(&self, event_type: &str, id: Option<SubscriptionId>) -> BusResult<bool> {
        let mut handlers = self.handlers.lock().await;

        let Some(list) = handlers.get_mut(event_type) else {
            return Ok(false);
        };

        let before = list.len();
        match id {
            Some(id) => list.retain(|r| r.id != id),
            None => list.clear(),
        }
        let removed = list.len() != before;

        if list.is_empty() {
            handlers.remove(event_type);
            if !self.closed.load(Ordering::SeqCst) {
                self.transport.unsubscribe(event_type).await?;
                info!(event_type, "Released channel");
            }
        }

        Ok(removed)
    }
}

/// Handle for one handler registration.
///
/// Dropping it leaves the handler registered; call [`Subscription::cancel`]
/// to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    event_type: String,
    bus: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Remove this handler. Returns `false` if it was already gone.
    pub async fn cancel(self) -> BusResult<bool> {
        match self.bus.upgrade() {
            Some(inner) => inner.unsubscribe(&self.event_type, Some(self.id)).await,
            None => Ok(false),
        }
    }
}

struct Dispatcher {
    handlers: HandlerTable,
    metrics: BusMetrics,
    ended_tx: watch::Sender<bool>,
}

impl Dispatcher {
    async fn run(self, mut stream: WireStream, mut shutdown_rx: watch::Receiver<bool>) {
        debug!("Dispatch loop running");

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!("Shutdown signal received, stopping dispatch loop");
                        break;
                    }
                }

                next = stream.next() => match next {
                    Some(message) => self.dispatch(message).await,
                    None => {
                        error!("Transport stream ended, event bus no longer delivers");
                        let _ = self.ended_tx.send(true);
                        break;
                    }
                },
            }
        }
    }

    async fn dispatch(&self, message: WireMessage) {
        let envelope = match Envelope::decode(&message.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(channel = %message.channel, error = %e, "Dropping malformed envelope");
                self.metrics.dropped(&message.channel, "malformed");
                return;
            }
        };

        if envelope.event_type != message.channel {
            warn!(
                channel = %message.channel,
                event_type = %envelope.event_type,
                event_id = %envelope.id,
                "Dropping envelope whose type does not match its channel"
            );
            self.metrics.dropped(&message.channel, "type_mismatch");
            return;
        }

        let handlers: Vec<Arc<dyn EventHandler>> = {
            let table = self.handlers.lock().await;
            table
                .get(&message.channel)
                .map(|list| list.iter().map(|r| r.handler.clone()).collect())
                .unwrap_or_default()
        };

        if handlers.is_empty() {
            debug!(channel = %message.channel, "No handlers for envelope");
            return;
        }

        let envelope = Arc::new(envelope);
        for handler in handlers {
            tokio::spawn(run_handler(handler, envelope.clone(), self.metrics.clone()));
        }
    }
}

async fn run_handler(handler: Arc<dyn EventHandler>, envelope: Arc<Envelope>, metrics: BusMetrics) {
    let name = handler.name();
    let started = Instant::now();

    let outcome = AssertUnwindSafe(handler.handle(&envelope))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {
            metrics.handled(&envelope.event_type, name, started.elapsed());
            debug!(
                handler = name,
                event_type = %envelope.event_type,
                event_id = %envelope.id,
                "Handler completed"
            );
        }
        Ok(Err(e)) => {
            metrics.handler_failed(&envelope.event_type, name, e.kind());
            error!(
                handler = name,
                event_type = %envelope.event_type,
                event_id = %envelope.id,
                correlation_id = %envelope.correlation_id,
                error = %e,
                "Event handler failed"
            );
        }
        Err(panic) => {
            metrics.handler_failed(&envelope.event_type, name, "panic");
            error!(
                handler = name,
                event_type = %envelope.event_type,
                event_id = %envelope.id,
                correlation_id = %envelope.correlation_id,
                panic = %panic_message(panic.as_ref()),
                "Event handler panicked"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
