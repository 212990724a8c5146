//! In-memory store, for tests and local runs without MongoDB

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{RewardError, RewardResult};
use crate::models::{Event, RequestStatus, Reward, RewardRequest, RewardRequestFilter};
use crate::repository::{EventRepository, RewardRepository, RewardRequestRepository};

#[derive(Default)]
pub struct InMemoryRewardStore {
    events: RwLock<HashMap<Uuid, Event>>,
    rewards: RwLock<Vec<Reward>>,
    requests: RwLock<HashMap<Uuid, RewardRequest>>,
}

impl InMemoryRewardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_event(&self, event: Event) -> Event {
        self.events.write().await.insert(event.id, event.clone());
        event
    }

    pub async fn insert_reward(&self, reward: Reward) -> Reward {
        self.rewards.write().await.push(reward.clone());
        reward
    }

    pub async fn request_count(&self) -> usize {
        self.requests.read().await.len()
    }
}

#[async_trait]
impl EventRepository for InMemoryRewardStore {
    async fn get_by_id(&self, id: Uuid) -> RewardResult<Option<Event>> {
        Ok(self.events.read().await.get(&id).cloned())
    }
}

#[async_trait]
impl RewardRepository for InMemoryRewardStore {
    async fn list_by_event(&self, event_id: Uuid) -> RewardResult<Vec<Reward>> {
        let rewards = self.rewards.read().await;
        Ok(rewards
            .iter()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RewardRequestRepository for InMemoryRewardStore {
    async fn create(&self, request: RewardRequest) -> RewardResult<RewardRequest> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id) {
            return Err(RewardError::Database(format!(
                "duplicate reward request id: {}",
                request.id
            )));
        }
        requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_by_id(&self, id: Uuid) -> RewardResult<Option<RewardRequest>> {
        Ok(self.requests.read().await.get(&id).cloned())
    }

    async fn find_active(&self, user_id: &str, event_id: Uuid) -> RewardResult<Vec<RewardRequest>> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .filter(|r| r.user_id == user_id && r.event_id == event_id && r.status.is_active())
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &RewardRequestFilter) -> RewardResult<Vec<RewardRequest>> {
        let requests = self.requests.read().await;
        let mut matching: Vec<RewardRequest> = requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        // v7 ids grow with creation time
        matching.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(matching)
    }

    async fn transition(
        &self,
        id: Uuid,
        status: RequestStatus,
        reason: Option<String>,
    ) -> RewardResult<Option<RewardRequest>> {
        let mut requests = self.requests.write().await;
        let Some(request) = requests.get_mut(&id) else {
            return Ok(None);
        };
        if !request.settle(status, reason) {
            return Ok(None);
        }
        Ok(Some(request.clone()))
    }
}
