use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::RewardResult;
use crate::models::{Event, RequestStatus, Reward, RewardRequest, RewardRequestFilter};

/// Read access to events
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> RewardResult<Option<Event>>;
}

/// Read access to the rewards attached to events
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RewardRepository: Send + Sync {
    /// Rewards of an event in insertion order
    async fn list_by_event(&self, event_id: Uuid) -> RewardResult<Vec<Reward>>;
}

/// Persistence for reward requests
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RewardRequestRepository: Send + Sync {
    async fn create(&self, request: RewardRequest) -> RewardResult<RewardRequest>;

    async fn get_by_id(&self, id: Uuid) -> RewardResult<Option<RewardRequest>>;

    /// PENDING or APPROVED requests for a user and event
    async fn find_active(&self, user_id: &str, event_id: Uuid) -> RewardResult<Vec<RewardRequest>>;

    /// Matching requests, newest first
    async fn list(&self, filter: &RewardRequestFilter) -> RewardResult<Vec<RewardRequest>>;

    /// Move a PENDING request to `status`.
    ///
    /// Returns the updated request, or `None` when the request is missing or
    /// already terminal. The check and the write are one atomic step.
    async fn transition(
        &self,
        id: Uuid,
        status: RequestStatus,
        reason: Option<String>,
    ) -> RewardResult<Option<RewardRequest>>;
}

/// The repositories the saga works with
#[derive(Clone)]
pub struct RewardStores {
    pub events: Arc<dyn EventRepository>,
    pub rewards: Arc<dyn RewardRepository>,
    pub requests: Arc<dyn RewardRequestRepository>,
}

impl RewardStores {
    pub fn new(
        events: Arc<dyn EventRepository>,
        rewards: Arc<dyn RewardRepository>,
        requests: Arc<dyn RewardRequestRepository>,
    ) -> Self {
        Self {
            events,
            rewards,
            requests,
        }
    }

    /// Use one store for all three repositories
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: EventRepository + RewardRepository + RewardRequestRepository + 'static,
    {
        Self {
            events: store.clone(),
            rewards: store.clone(),
            requests: store,
        }
    }
}
