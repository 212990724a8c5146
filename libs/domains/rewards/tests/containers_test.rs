//! Saga against real MongoDB and Redis.
//!
//! Requires Docker: `cargo test -p domain_rewards -- --ignored`

use chrono::{Duration, Utc};
use domain_rewards::{
    Event, MongoRewardStore, RequestStatus, Reward, RewardRequest, RewardRequestFilter,
    RewardRequestRepository, RewardSaga, RewardStores, RewardType,
};
use messaging::{EventBus, RedisTransport};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use test_utils::assertions::eventually;
use test_utils::{TestDataBuilder, TestMongo, TestRedis};

fn running(title: &str) -> Event {
    let now = Utc::now();
    Event::new(title, now - Duration::hours(1), now + Duration::hours(1))
}

#[tokio::test]
#[ignore] // Requires Docker
async fn mongo_store_transitions_only_pending() {
    let mongo = TestMongo::new().await;
    let data = TestDataBuilder::from_test_name("mongo_store_transitions_only_pending");
    let store = MongoRewardStore::new(&mongo.database(&data.name("rewards", "store")));
    store.create_indexes().await.unwrap();

    let request = store
        .create(RewardRequest::pending(data.user_id("a"), data.uuid(1)))
        .await
        .unwrap();

    let approved = store
        .transition(request.id, RequestStatus::Approved, Some("POINT 5 granted".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);

    let again = store
        .transition(request.id, RequestStatus::Rejected, None)
        .await
        .unwrap();
    assert!(again.is_none());

    let active = store
        .find_active(&request.user_id, request.event_id)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);

    let listed = store
        .list(&RewardRequestFilter::for_user(request.user_id.clone()))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].reason.as_deref(), Some("POINT 5 granted"));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn saga_settles_over_redis_and_mongo() {
    let mongo = TestMongo::new().await;
    let redis = TestRedis::new().await;
    let data = TestDataBuilder::from_test_name("saga_settles_over_redis_and_mongo");

    let store = Arc::new(MongoRewardStore::new(
        &mongo.database(&data.name("rewards", "saga")),
    ));
    store.create_indexes().await.unwrap();

    let event = running("Redis launch");
    store.insert_event(&event).await.unwrap();
    store
        .insert_reward(&Reward::new(event.id, "points", RewardType::Point, 100))
        .await
        .unwrap();

    let transport = RedisTransport::new(redis.client(), redis.connection_manager().await);
    let bus = EventBus::start(Arc::new(transport)).await.unwrap();
    let saga = RewardSaga::start(RewardStores::from_store(store.clone()), bus.clone())
        .await
        .unwrap();

    let user = data.user_id("player");
    let request_id = saga.claim(&user, event.id).await.unwrap().id;

    let settled = eventually(StdDuration::from_secs(10), "request settles", || {
        let saga = &saga;
        async move {
            saga.get_request(request_id)
                .await
                .ok()
                .filter(|r| r.status.is_terminal())
        }
    })
    .await;

    assert_eq!(settled.status, RequestStatus::Approved);
    assert_eq!(settled.reason.as_deref(), Some("POINT 100 granted"));

    saga.shutdown().await;
    bus.shutdown().await.unwrap();
}
