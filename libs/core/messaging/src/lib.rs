//! Publish/subscribe event bus.
//!
//! Publishers hand an [`NewEnvelope`] to the [`EventBus`], which stamps it and
//! sends it on the channel named after its event type. Every handler
//! subscribed to that type receives the envelope in its own task; a failing
//! or panicking handler is logged and never affects the others.
//!
//! ```text
//! ┌───────────┐  publish   ┌──────────────┐  channel "reward.requested"  ┌──────────────┐
//! │ Publisher │──────────▶│   EventBus   │─────────────────────────────▶│  Transport   │
//! └───────────┘            └──────────────┘                              │ (Redis/mem)  │
//!                                 ▲                                      └──────┬───────┘
//!                                 │ dispatch loop                               │
//!                          ┌──────┴───────┐        one task per handler         │
//!                          │  Dispatcher  │◀────────────────────────────────────┘
//!                          └──────┬───────┘
//!                                 ▼
//!                       ┌─────────────────────┐
//!                       │ EventHandler × N    │
//!                       └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use messaging::{handler_fn, EventBus, InMemoryTransport, NewEnvelope};
//!
//! let bus = EventBus::start(Arc::new(InMemoryTransport::new())).await?;
//!
//! let subscription = bus
//!     .subscribe("reward.requested", Arc::new(handler_fn("audit", |envelope| async move {
//!         tracing::info!(id = %envelope.id, "seen");
//!         Ok(())
//!     })))
//!     .await?;
//!
//! bus.publish(NewEnvelope::new("reward.requested", "req-1", json!({ "userId": "u1" }))).await?;
//!
//! subscription.cancel().await?;
//! bus.shutdown().await?;
//! ```

mod bus;
mod envelope;
mod error;
mod handler;
mod metrics;
mod transport;

pub use bus::{EventBus, Subscription, SubscriptionId};
pub use envelope::{Envelope, NewEnvelope};
pub use error::{BusError, BusResult, HandlerError};
pub use handler::{handler_fn, EventHandler, FnHandler};
pub use transport::{InMemoryTransport, Transport, WireMessage, WireStream};

#[cfg(feature = "redis")]
pub use transport::RedisTransport;
