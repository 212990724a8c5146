//! MongoDB implementation of the reward repositories

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{Binary, Bson, Document, doc, to_bson};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};
use tracing::instrument;
use uuid::Uuid;

use crate::error::RewardResult;
use crate::models::{Event, RequestStatus, Reward, RewardRequest, RewardRequestFilter};
use crate::repository::{EventRepository, RewardRepository, RewardRequestRepository};

/// Collections `events`, `rewards` and `reward_requests` of one database
#[derive(Clone)]
pub struct MongoRewardStore {
    events: Collection<Event>,
    rewards: Collection<Reward>,
    requests: Collection<RewardRequest>,
}

/// UUIDs are stored in the driver's binary form (generic subtype)
fn uuid_bson(id: Uuid) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Generic,
        bytes: id.as_bytes().to_vec(),
    })
}

impl MongoRewardStore {
    /// `created_at` is stored as an RFC 3339 string with variable precision,
    /// which does not sort chronologically. v7 ids do.
    fn newest_first() -> FindOptions {
        FindOptions::builder().sort(doc! { "_id": -1 }).build()
    }

    pub fn new(database: &Database) -> Self {
        Self {
            events: database.collection("events"),
            rewards: database.collection("rewards"),
            requests: database.collection("reward_requests"),
        }
    }

    /// Create indexes for the saga's lookups
    pub async fn create_indexes(&self) -> RewardResult<()> {
        self.rewards
            .create_index(IndexModel::builder().keys(doc! { "event_id": 1 }).build())
            .await?;

        let request_indexes = vec![
            // Duplicate-claim check; not unique, rejected requests may repeat
            IndexModel::builder()
                .keys(doc! { "user_id": 1, "event_id": 1, "status": 1 })
                .build(),
        ];
        self.requests.create_indexes(request_indexes).await?;

        tracing::info!("Reward indexes created");
        Ok(())
    }

    pub async fn insert_event(&self, event: &Event) -> RewardResult<()> {
        self.events.insert_one(event).await?;
        Ok(())
    }

    pub async fn insert_reward(&self, reward: &Reward) -> RewardResult<()> {
        self.rewards.insert_one(reward).await?;
        Ok(())
    }

    fn build_filter(filter: &RewardRequestFilter) -> Document {
        let mut doc = doc! {};

        if let Some(ref user_id) = filter.user_id {
            doc.insert("user_id", user_id);
        }

        if let Some(event_id) = filter.event_id {
            doc.insert("event_id", uuid_bson(event_id));
        }

        if let Some(status) = filter.status {
            doc.insert("status", status.to_string());
        }

        doc
    }
}

#[async_trait]
impl EventRepository for MongoRewardStore {
    #[instrument(skip(self))]
    async fn get_by_id(&self, id: Uuid) -> RewardResult<Option<Event>> {
        Ok(self.events.find_one(doc! { "_id": uuid_bson(id) }).await?)
    }
}

#[async_trait]
impl RewardRepository for MongoRewardStore {
    #[instrument(skip(self))]
    async fn list_by_event(&self, event_id: Uuid) -> RewardResult<Vec<Reward>> {
        // v7 ids grow with creation time
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let cursor = self
            .rewards
            .find(doc! { "event_id": uuid_bson(event_id) })
            .with_options(options)
            .await?;
        Ok(cursor.try_collect().await?)
    }
}

#[async_trait]
impl RewardRequestRepository for MongoRewardStore {
    #[instrument(skip(self, request), fields(request_id = %request.id, user_id = %request.user_id))]
    async fn create(&self, request: RewardRequest) -> RewardResult<RewardRequest> {
        self.requests.insert_one(&request).await?;
        tracing::debug!("Reward request stored");
        Ok(request)
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: Uuid) -> RewardResult<Option<RewardRequest>> {
        Ok(self.requests.find_one(doc! { "_id": uuid_bson(id) }).await?)
    }

    #[instrument(skip(self))]
    async fn find_active(&self, user_id: &str, event_id: Uuid) -> RewardResult<Vec<RewardRequest>> {
        let filter = doc! {
            "user_id": user_id,
            "event_id": uuid_bson(event_id),
            "status": {
                "$in": [
                    RequestStatus::Pending.to_string(),
                    RequestStatus::Approved.to_string(),
                ]
            },
        };
        let cursor = self.requests.find(filter).await?;
        Ok(cursor.try_collect().await?)
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &RewardRequestFilter) -> RewardResult<Vec<RewardRequest>> {
        let cursor = self
            .requests
            .find(Self::build_filter(filter))
            .with_options(Self::newest_first())
            .await?;
        Ok(cursor.try_collect().await?)
    }

    #[instrument(skip(self, reason))]
    async fn transition(
        &self,
        id: Uuid,
        status: RequestStatus,
        reason: Option<String>,
    ) -> RewardResult<Option<RewardRequest>> {
        // Matching on PENDING keeps terminal states final under redelivery
        let filter = doc! {
            "_id": uuid_bson(id),
            "status": RequestStatus::Pending.to_string(),
        };
        let update = doc! {
            "$set": {
                "status": status.to_string(),
                "reason": reason,
                "updated_at": to_bson(&Utc::now())?,
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        Ok(self
            .requests
            .find_one_and_update(filter, update)
            .with_options(options)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_sorts_on_id_only() {
        let options = MongoRewardStore::newest_first();
        assert_eq!(options.sort, Some(doc! { "_id": -1 }));
    }

    #[test]
    fn test_build_filter_empty() {
        let doc = MongoRewardStore::build_filter(&RewardRequestFilter::default());
        assert!(doc.is_empty());
    }

    #[test]
    fn test_build_filter_all_fields() {
        let event_id = Uuid::now_v7();
        let filter = RewardRequestFilter::for_user("u1")
            .with_event(event_id)
            .with_status(RequestStatus::Rejected);

        let doc = MongoRewardStore::build_filter(&filter);

        assert_eq!(doc.get_str("user_id").unwrap(), "u1");
        assert_eq!(doc.get_str("status").unwrap(), "REJECTED");
        assert_eq!(doc.get("event_id"), Some(&uuid_bson(event_id)));
    }

    #[test]
    fn test_uuid_bson_matches_document_encoding() {
        let request = RewardRequest::pending("u1", Uuid::now_v7());
        let raw = mongodb::bson::to_raw_document_buf(&request).unwrap();
        let doc = raw.to_document().unwrap();

        assert_eq!(doc.get("_id"), Some(&uuid_bson(request.id)));
        assert_eq!(doc.get("event_id"), Some(&uuid_bson(request.event_id)));
    }
}
