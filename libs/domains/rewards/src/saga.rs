//! Reward-request saga coordinator.
//!
//! `claim` validates and persists a PENDING request, then publishes
//! `reward.requested`. The handlers in [`crate::handlers`] take it from
//! there; the caller never waits for fulfillment.

use chrono::Utc;
use messaging::{Envelope, EventBus, EventHandler, Subscription};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{RewardError, RewardResult};
use crate::events::{RewardEvent, RewardEventType, RewardRequested};
use crate::handlers::{FailedHandler, ProcessedHandler, RequestedHandler};
use crate::metrics;
use crate::models::{ClaimResponse, RequestStatus, RewardRequest, RewardRequestFilter};
use crate::repository::RewardStores;

pub struct RewardSaga {
    stores: RewardStores,
    bus: EventBus,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl RewardSaga {
    /// Subscribe the saga's handlers and return the coordinator.
    pub async fn start(stores: RewardStores, bus: EventBus) -> RewardResult<Self> {
        let handlers: [(RewardEventType, Arc<dyn EventHandler>); 3] = [
            (
                RewardEventType::Requested,
                Arc::new(RequestedHandler::new(stores.clone(), bus.clone())),
            ),
            (
                RewardEventType::Processed,
                Arc::new(ProcessedHandler::new(stores.clone())),
            ),
            (
                RewardEventType::Failed,
                Arc::new(FailedHandler::new(stores.clone())),
            ),
        ];

        let mut subscriptions = Vec::with_capacity(handlers.len());
        for (event_type, handler) in handlers {
            match bus.subscribe(event_type.as_str(), handler).await {
                Ok(subscription) => subscriptions.push(subscription),
                Err(e) => {
                    for subscription in subscriptions {
                        let _ = subscription.cancel().await;
                    }
                    return Err(e.into());
                }
            }
        }

        info!("Reward saga started");

        Ok(Self {
            stores,
            bus,
            subscriptions: Mutex::new(subscriptions),
        })
    }

    /// Accept a claim and start fulfillment.
    ///
    /// Returns the PENDING request. If publishing fails the request is
    /// already stored and stays PENDING; see [`RewardSaga::republish`].
    #[instrument(skip(self))]
    pub async fn claim(&self, user_id: &str, event_id: Uuid) -> RewardResult<RewardRequest> {
        let result = self.try_claim(user_id, event_id).await;
        metrics::claim(result.as_ref().map_or_else(RewardError::kind, |_| "accepted"));
        result
    }

    async fn try_claim(&self, user_id: &str, event_id: Uuid) -> RewardResult<RewardRequest> {
        let event = self
            .stores
            .events
            .get_by_id(event_id)
            .await?
            .ok_or_else(|| RewardError::not_found("Event", event_id))?;

        if !event.is_active {
            return Err(RewardError::business_rule("Event is not active"));
        }

        if !event.is_in_progress(Utc::now()) {
            return Err(RewardError::business_rule("Event is not in progress"));
        }

        let active = self.stores.requests.find_active(user_id, event_id).await?;
        if !active.is_empty() {
            return Err(RewardError::conflict(
                "Reward already requested for this event",
            ));
        }

        let request = self
            .stores
            .requests
            .create(RewardRequest::pending(user_id, event_id))
            .await?;

        info!(request_id = %request.id, "Reward request created");

        if let Err(e) = self.publish_requested(&request, false).await {
            error!(
                request_id = %request.id,
                error = %e,
                "Failed to publish reward request, left PENDING"
            );
            return Err(e);
        }

        Ok(request)
    }

    /// [`RewardSaga::claim`] shaped for the HTTP collaborator
    pub async fn claim_response(&self, user_id: &str, event_id: Uuid) -> RewardResult<ClaimResponse> {
        let request = self.claim(user_id, event_id).await?;
        Ok(ClaimResponse::from(&request))
    }

    /// Publish `reward.requested` again for a request stuck in PENDING.
    ///
    /// The envelope gets a fresh id so it is not mistaken for the original.
    #[instrument(skip(self))]
    pub async fn republish(&self, request_id: Uuid) -> RewardResult<Envelope> {
        let request = self.get_request(request_id).await?;
        if request.status.is_terminal() {
            return Err(RewardError::conflict(format!(
                "Reward request is already {}",
                request.status
            )));
        }

        let envelope = self.publish_requested(&request, true).await?;
        info!(event_id = %envelope.id, "Reward request republished");
        Ok(envelope)
    }

    /// Settle a PENDING request by hand, e.g. when fulfillment is stuck.
    ///
    /// Goes through the same guarded transition as the handlers, so a
    /// request that is already APPROVED or REJECTED is refused.
    #[instrument(skip(self, reason))]
    pub async fn resolve(
        &self,
        request_id: Uuid,
        status: RequestStatus,
        reason: Option<String>,
    ) -> RewardResult<RewardRequest> {
        if !status.is_terminal() {
            return Err(RewardError::business_rule(format!(
                "Cannot resolve a request to {}",
                status
            )));
        }

        match self
            .stores
            .requests
            .transition(request_id, status, reason)
            .await?
        {
            Some(request) => {
                metrics::settled(status);
                info!(status = %status, "Reward request resolved manually");
                Ok(request)
            }
            None => {
                let current = self.get_request(request_id).await?;
                Err(RewardError::conflict(format!(
                    "Reward request is already {}",
                    current.status
                )))
            }
        }
    }

    async fn publish_requested(
        &self,
        request: &RewardRequest,
        fresh_id: bool,
    ) -> RewardResult<Envelope> {
        let payload = RewardRequested {
            user_id: request.user_id.clone(),
            event_id: request.event_id,
            request_id: request.id,
        };
        let mut envelope = payload.to_envelope(&request.id.to_string())?;
        if fresh_id {
            envelope.id = None;
        }
        Ok(self.bus.publish(envelope).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_request(&self, request_id: Uuid) -> RewardResult<RewardRequest> {
        self.stores
            .requests
            .get_by_id(request_id)
            .await?
            .ok_or_else(|| RewardError::not_found("Reward request", request_id))
    }

    /// Matching requests, newest first
    #[instrument(skip(self))]
    pub async fn list_requests(
        &self,
        filter: &RewardRequestFilter,
    ) -> RewardResult<Vec<RewardRequest>> {
        self.stores.requests.list(filter).await
    }

    pub async fn requests_for_user(&self, user_id: &str) -> RewardResult<Vec<RewardRequest>> {
        self.list_requests(&RewardRequestFilter::for_user(user_id))
            .await
    }

    /// Cancel the saga's subscriptions. The bus itself stays up.
    pub async fn shutdown(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock().await);
        for subscription in subscriptions {
            let event_type = subscription.event_type().to_string();
            if let Err(e) = subscription.cancel().await {
                warn!(event_type = %event_type, error = %e, "Failed to cancel saga subscription");
            }
        }
        info!("Reward saga stopped");
    }
}
