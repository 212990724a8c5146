//! Bus handlers driving a request from REQUESTED to a terminal state.

use async_trait::async_trait;
use chrono::Utc;
use messaging::{Envelope, EventBus, EventHandler, HandlerError};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{RewardError, RewardResult};
use crate::events::{RewardEvent, RewardFailed, RewardProcessed, RewardRequested};
use crate::metrics;
use crate::models::{RequestStatus, Reward};
use crate::repository::{RewardRequestRepository, RewardStores};

/// Re-validates a requested claim and publishes PROCESSED or FAILED.
///
/// Never writes to the store; the outcome handlers do.
pub struct RequestedHandler {
    stores: RewardStores,
    bus: EventBus,
}

impl RequestedHandler {
    pub fn new(stores: RewardStores, bus: EventBus) -> Self {
        Self { stores, bus }
    }

    /// The reward to grant, or why none can be granted
    async fn evaluate(&self, requested: &RewardRequested) -> RewardResult<Reward> {
        let event_id = requested.event_id;
        let event = self
            .stores
            .events
            .get_by_id(event_id)
            .await?
            .ok_or_else(|| RewardError::not_found("Event", event_id))?;

        if !event.is_active {
            return Err(RewardError::business_rule(format!(
                "Event is not active: {}",
                event_id
            )));
        }

        if !event.is_in_progress(Utc::now()) {
            return Err(RewardError::business_rule(format!(
                "Event is not in progress: {}",
                event_id
            )));
        }

        // The triggering request is itself PENDING
        let active = self
            .stores
            .requests
            .find_active(&requested.user_id, event_id)
            .await?;
        if let Some(other) = active.iter().find(|r| r.id != requested.request_id) {
            return Err(RewardError::conflict(format!(
                "An active or approved request already exists: {}",
                other.id
            )));
        }

        // First reward wins
        self.stores
            .rewards
            .list_by_event(event_id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RewardError::business_rule(format!("No rewards configured for event: {}", event_id))
            })
    }
}

#[async_trait]
impl EventHandler for RequestedHandler {
    #[instrument(skip_all, fields(correlation_id = %envelope.correlation_id))]
    async fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        let requested: RewardRequested = envelope.data_as()?;

        let outcome = match self.evaluate(&requested).await {
            Ok(reward) => {
                metrics::evaluated("processed");
                info!(
                    request_id = %requested.request_id,
                    reward_id = %reward.id,
                    reward_type = %reward.reward_type,
                    "Reward selected"
                );
                RewardProcessed {
                    user_id: requested.user_id,
                    event_id: requested.event_id,
                    request_id: requested.request_id,
                    reward_type: reward.reward_type,
                    reward_amount: reward.amount,
                }
                .to_envelope(&envelope.correlation_id)
            }
            Err(err) => {
                metrics::evaluated(err.kind());
                warn!(request_id = %requested.request_id, reason = %err, "Reward request refused");
                RewardFailed {
                    user_id: requested.user_id,
                    event_id: requested.event_id,
                    request_id: requested.request_id,
                    reason: err.to_string(),
                }
                .to_envelope(&envelope.correlation_id)
            }
        }
        .map_err(|e| HandlerError::failed_with_source("failed to build saga outcome", e))?;

        // Request stays PENDING until `republish` re-drives it
        self.bus.publish(outcome).await.map_err(|e| {
            error!(error = %e, "Failed to publish saga outcome");
            HandlerError::failed_with_source("failed to publish saga outcome", e)
        })?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "reward_requested"
    }
}

/// Marks a request APPROVED
pub struct ProcessedHandler {
    stores: RewardStores,
}

impl ProcessedHandler {
    pub fn new(stores: RewardStores) -> Self {
        Self { stores }
    }
}

#[async_trait]
impl EventHandler for ProcessedHandler {
    #[instrument(skip_all, fields(correlation_id = %envelope.correlation_id))]
    async fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        let processed: RewardProcessed = envelope.data_as()?;
        settle(
            self.stores.requests.as_ref(),
            processed.request_id(),
            RequestStatus::Approved,
            processed.reason(),
        )
        .await
    }

    fn name(&self) -> &'static str {
        "reward_processed"
    }
}

/// Marks a request REJECTED with the failure reason
pub struct FailedHandler {
    stores: RewardStores,
}

impl FailedHandler {
    pub fn new(stores: RewardStores) -> Self {
        Self { stores }
    }
}

#[async_trait]
impl EventHandler for FailedHandler {
    #[instrument(skip_all, fields(correlation_id = %envelope.correlation_id))]
    async fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        let failed: RewardFailed = envelope.data_as()?;
        let request_id = failed.request_id();
        settle(
            self.stores.requests.as_ref(),
            request_id,
            RequestStatus::Rejected,
            failed.reason,
        )
        .await
    }

    fn name(&self) -> &'static str {
        "reward_failed"
    }
}

/// Apply a terminal status; missing or already settled requests are logged and skipped.
async fn settle(
    requests: &dyn RewardRequestRepository,
    request_id: Uuid,
    status: RequestStatus,
    reason: String,
) -> Result<(), HandlerError> {
    let updated = requests
        .transition(request_id, status, Some(reason))
        .await
        .map_err(|e| HandlerError::failed_with_source("failed to settle reward request", e))?;

    if let Some(request) = updated {
        metrics::settled(request.status);
        info!(
            request_id = %request.id,
            user_id = %request.user_id,
            status = %request.status,
            reason = request.reason.as_deref().unwrap_or_default(),
            "Reward request settled"
        );
        return Ok(());
    }

    let existing = requests
        .get_by_id(request_id)
        .await
        .map_err(|e| HandlerError::failed_with_source("failed to load reward request", e))?;

    match existing {
        Some(request) => {
            metrics::ignored("terminal");
            info!(
                request_id = %request_id,
                current = %request.status,
                requested = %status,
                "Reward request already settled, ignoring"
            );
        }
        None => {
            metrics::ignored("not_found");
            warn!(request_id = %request_id, "Reward request not found, dropping outcome");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRewardStore;
    use crate::models::{Event, RewardRequest, RewardType};
    use crate::repository::{MockEventRepository, MockRewardRepository, MockRewardRequestRepository};
    use chrono::Duration;
    use messaging::InMemoryTransport;
    use std::sync::Arc;

    fn envelope_for<E: RewardEvent>(payload: &E) -> Envelope {
        let new = payload.to_envelope("corr-1").unwrap();
        Envelope {
            id: new.id.unwrap_or_default(),
            event_type: new.event_type,
            timestamp: Utc::now(),
            correlation_id: new.correlation_id,
            data: new.data,
        }
    }

    fn live_event() -> Event {
        let now = Utc::now();
        Event::new("Spring festival", now - Duration::days(1), now + Duration::days(1))
    }

    async fn bus() -> (EventBus, InMemoryTransport) {
        let transport = InMemoryTransport::new();
        let bus = EventBus::start(Arc::new(transport.clone())).await.unwrap();
        (bus, transport)
    }

    fn published(transport: &InMemoryTransport) -> Vec<Envelope> {
        transport
            .published()
            .into_iter()
            .map(|message| Envelope::decode(&message.payload).unwrap())
            .collect()
    }

    async fn requested_handler(
        store: Arc<InMemoryRewardStore>,
    ) -> (RequestedHandler, InMemoryTransport) {
        let (bus, transport) = bus().await;
        (
            RequestedHandler::new(RewardStores::from_store(store), bus),
            transport,
        )
    }

    #[tokio::test]
    async fn test_requested_publishes_processed_with_first_reward() {
        let store = Arc::new(InMemoryRewardStore::new());
        let event = store.insert_event(live_event()).await;
        store
            .insert_reward(Reward::new(event.id, "points", RewardType::Point, 100))
            .await;
        store
            .insert_reward(Reward::new(event.id, "coupon", RewardType::Coupon, 1))
            .await;
        let request = store
            .create(RewardRequest::pending("u1", event.id))
            .await
            .unwrap();

        let (handler, transport) = requested_handler(store).await;
        let requested = RewardRequested {
            user_id: "u1".into(),
            event_id: event.id,
            request_id: request.id,
        };
        handler.handle(&envelope_for(&requested)).await.unwrap();

        let sent = published(&transport);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event_type, "reward.processed");
        assert_eq!(sent[0].id, format!("{}-processed", request.id));
        assert_eq!(sent[0].correlation_id, "corr-1");
        assert_eq!(sent[0].data["rewardType"], "POINT");
        assert_eq!(sent[0].data["rewardAmount"], 100);
    }

    #[tokio::test]
    async fn test_requested_fails_without_rewards() {
        let store = Arc::new(InMemoryRewardStore::new());
        let event = store.insert_event(live_event()).await;
        let request = store
            .create(RewardRequest::pending("u1", event.id))
            .await
            .unwrap();

        let (handler, transport) = requested_handler(store).await;
        let requested = RewardRequested {
            user_id: "u1".into(),
            event_id: event.id,
            request_id: request.id,
        };
        handler.handle(&envelope_for(&requested)).await.unwrap();

        let sent = published(&transport);
        assert_eq!(sent[0].event_type, "reward.failed");
        assert_eq!(sent[0].id, format!("{}-failed", request.id));
        assert_eq!(
            sent[0].data["reason"],
            format!("No rewards configured for event: {}", event.id)
        );
    }

    #[tokio::test]
    async fn test_requested_fails_on_other_active_request() {
        let store = Arc::new(InMemoryRewardStore::new());
        let event = store.insert_event(live_event()).await;
        store
            .insert_reward(Reward::new(event.id, "points", RewardType::Point, 100))
            .await;
        let first = store
            .create(RewardRequest::pending("u1", event.id))
            .await
            .unwrap();
        let second = store
            .create(RewardRequest::pending("u1", event.id))
            .await
            .unwrap();

        let (handler, transport) = requested_handler(store).await;
        let requested = RewardRequested {
            user_id: "u1".into(),
            event_id: event.id,
            request_id: second.id,
        };
        handler.handle(&envelope_for(&requested)).await.unwrap();

        let sent = published(&transport);
        assert_eq!(sent[0].event_type, "reward.failed");
        assert_eq!(
            sent[0].data["reason"],
            format!("An active or approved request already exists: {}", first.id)
        );
    }

    #[tokio::test]
    async fn test_requested_fails_for_inactive_event() {
        let store = Arc::new(InMemoryRewardStore::new());
        let event = store.insert_event(live_event().with_active(false)).await;

        let (handler, transport) = requested_handler(store).await;
        let requested = RewardRequested {
            user_id: "u1".into(),
            event_id: event.id,
            request_id: Uuid::now_v7(),
        };
        handler.handle(&envelope_for(&requested)).await.unwrap();

        let sent = published(&transport);
        assert_eq!(
            sent[0].data["reason"],
            format!("Event is not active: {}", event.id)
        );
    }

    #[tokio::test]
    async fn test_requested_turns_store_errors_into_failed() {
        let mut events = MockEventRepository::new();
        events
            .expect_get_by_id()
            .returning(|_| Err(RewardError::Database("connection reset".into())));
        let mut rewards = MockRewardRepository::new();
        rewards.expect_list_by_event().never();
        let requests = MockRewardRequestRepository::new();

        let stores = RewardStores::new(Arc::new(events), Arc::new(rewards), Arc::new(requests));
        let (bus, transport) = bus().await;
        let handler = RequestedHandler::new(stores, bus);

        let requested = RewardRequested {
            user_id: "u1".into(),
            event_id: Uuid::now_v7(),
            request_id: Uuid::now_v7(),
        };
        handler.handle(&envelope_for(&requested)).await.unwrap();

        let sent = published(&transport);
        assert_eq!(sent[0].event_type, "reward.failed");
        assert_eq!(sent[0].data["reason"], "Database error: connection reset");
    }

    #[tokio::test]
    async fn test_requested_surfaces_publish_failure() {
        let store = Arc::new(InMemoryRewardStore::new());
        let (handler, transport) = requested_handler(store).await;
        transport.set_fail_publish(true);

        let requested = RewardRequested {
            user_id: "u1".into(),
            event_id: Uuid::now_v7(),
            request_id: Uuid::now_v7(),
        };
        let err = handler
            .handle(&envelope_for(&requested))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "failed");
    }

    #[tokio::test]
    async fn test_requested_rejects_malformed_payload() {
        let store = Arc::new(InMemoryRewardStore::new());
        let (handler, _transport) = requested_handler(store).await;

        let envelope = envelope_for(&RewardRequested {
            user_id: "u1".into(),
            event_id: Uuid::now_v7(),
            request_id: Uuid::now_v7(),
        });
        let broken = Envelope {
            data: serde_json::json!({ "userId": 7 }),
            ..envelope
        };

        let err = handler.handle(&broken).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_payload");
    }

    #[tokio::test]
    async fn test_processed_approves_once() {
        let store = Arc::new(InMemoryRewardStore::new());
        let request = store
            .create(RewardRequest::pending("u1", Uuid::now_v7()))
            .await
            .unwrap();
        let handler = ProcessedHandler::new(RewardStores::from_store(store.clone()));

        let processed = RewardProcessed {
            user_id: "u1".into(),
            event_id: request.event_id,
            request_id: request.id,
            reward_type: RewardType::Point,
            reward_amount: 100,
        };
        handler.handle(&envelope_for(&processed)).await.unwrap();
        // Redelivery is a no-op
        handler.handle(&envelope_for(&processed)).await.unwrap();

        let stored = RewardRequestRepository::get_by_id(store.as_ref(), request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, RequestStatus::Approved);
        assert_eq!(stored.reason.as_deref(), Some("POINT 100 granted"));
    }

    #[tokio::test]
    async fn test_failed_does_not_override_approved() {
        let store = Arc::new(InMemoryRewardStore::new());
        let request = store
            .create(RewardRequest::pending("u1", Uuid::now_v7()))
            .await
            .unwrap();
        store
            .transition(request.id, RequestStatus::Approved, Some("ITEM 1 granted".into()))
            .await
            .unwrap();

        let handler = FailedHandler::new(RewardStores::from_store(store.clone()));
        let failed = RewardFailed {
            user_id: "u1".into(),
            event_id: request.event_id,
            request_id: request.id,
            reason: "late".into(),
        };
        handler.handle(&envelope_for(&failed)).await.unwrap();

        let stored = RewardRequestRepository::get_by_id(store.as_ref(), request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, RequestStatus::Approved);
    }

    #[tokio::test]
    async fn test_outcome_for_unknown_request_is_dropped() {
        let store = Arc::new(InMemoryRewardStore::new());
        let handler = FailedHandler::new(RewardStores::from_store(store.clone()));

        let failed = RewardFailed {
            user_id: "u1".into(),
            event_id: Uuid::now_v7(),
            request_id: Uuid::now_v7(),
            reason: "Event not found".into(),
        };

        handler.handle(&envelope_for(&failed)).await.unwrap();
        assert_eq!(store.request_count().await, 0);
    }

    #[tokio::test]
    async fn test_settle_reports_store_errors() {
        let mut requests = MockRewardRequestRepository::new();
        requests
            .expect_transition()
            .returning(|_, _, _| Err(RewardError::Database("timeout".into())));

        let err = settle(&requests, Uuid::now_v7(), RequestStatus::Approved, "x".into())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "failed to settle reward request");
    }

    #[test]
    fn test_handler_names() {
        let stores = RewardStores::from_store(Arc::new(InMemoryRewardStore::new()));
        assert_eq!(ProcessedHandler::new(stores.clone()).name(), "reward_processed");
        assert_eq!(FailedHandler::new(stores).name(), "reward_failed");
    }
}
