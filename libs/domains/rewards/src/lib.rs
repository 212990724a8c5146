//! Rewards Domain
//!
//! Event-driven saga that takes a user's reward claim from PENDING to
//! APPROVED or REJECTED.
//!
//! # Architecture
//!
//! ```text
//! claim(user, event) ──▶ validate ──▶ store PENDING ──▶ publish reward.requested
//!                                                              │
//!                        ┌─────────────────────────────────────┘
//!                        ▼
//!               RequestedHandler: re-validate, pick first reward
//!                  │                                  │
//!       reward.processed                        reward.failed
//!                  ▼                                  ▼
//!        ProcessedHandler: APPROVED          FailedHandler: REJECTED
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_rewards::{InMemoryRewardStore, RewardSaga, RewardStores};
//! use messaging::{EventBus, InMemoryTransport};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = EventBus::start(Arc::new(InMemoryTransport::new())).await?;
//! let stores = RewardStores::from_store(Arc::new(InMemoryRewardStore::new()));
//! let saga = RewardSaga::start(stores, bus.clone()).await?;
//!
//! let request = saga.claim("user-1", uuid::Uuid::now_v7()).await?;
//! println!("{} is {}", request.id, request.status);
//!
//! saga.shutdown().await;
//! bus.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod handlers;
pub mod memory;
mod metrics;
pub mod models;
pub mod mongodb;
pub mod repository;
pub mod saga;

// Re-export commonly used types
pub use error::{RewardError, RewardResult};
pub use events::{RewardEvent, RewardEventType, RewardFailed, RewardProcessed, RewardRequested};
pub use memory::InMemoryRewardStore;
pub use models::{
    ClaimResponse, Event, RequestStatus, Reward, RewardRequest, RewardRequestFilter, RewardType,
};
pub use mongodb::MongoRewardStore;
pub use repository::{EventRepository, RewardRepository, RewardRequestRepository, RewardStores};
pub use saga::RewardSaga;
