//! Handler contract for subscribers.

use crate::envelope::Envelope;
use crate::error::HandlerError;
use async_trait::async_trait;
use std::future::Future;

/// Reacts to envelopes of the event types it is subscribed to.
///
/// Each delivery runs in its own task. Returning an error (or panicking) is
/// logged by the bus with the handler's [`name`](EventHandler::name) and
/// does not affect other handlers or later deliveries.
///
/// ```rust,ignore
/// struct AuditHandler { store: Arc<AuditStore> }
///
/// #[async_trait]
/// impl EventHandler for AuditHandler {
///     async fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError> {
///         self.store
///             .append(&envelope.correlation_id, &envelope.data)
///             .await
///             .map_err(|e| HandlerError::failed_with_source("audit append failed", e))
///     }
///
///     fn name(&self) -> &'static str {
///         "audit"
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError>;

    /// Used in logs and metric labels.
    fn name(&self) -> &'static str;
}

/// Closure-backed handler, see [`handler_fn`].
pub struct FnHandler<F> {
    name: &'static str,
    f: F,
}

/// Wrap an async closure as an [`EventHandler`].
pub fn handler_fn<F, Fut>(name: &'static str, f: F) -> FnHandler<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    FnHandler { name, f }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        (self.f)(envelope.clone()).await
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
