//! Connectors for the stores behind the reward services.
//!
//! # Features
//!
//! - `redis` (default) - Redis connection manager and pub/sub client
//! - `mongodb` - MongoDB client with pool settings
//! - `config` - `core_config::FromEnv` for the connection configs
//! - `all` - everything above
//!
//! # Examples
//!
//! ```ignore
//! use database::redis::{self, RedisConfig};
//!
//! let config = RedisConfig::new("redis://127.0.0.1:6379");
//! let manager = redis::connect_from_config(&config).await?;
//! let pubsub_client = redis::open_client(&config)?;
//! ```
//!
//! ```ignore
//! use database::mongodb::{self, MongoConfig};
//!
//! let config = MongoConfig::with_database("mongodb://localhost:27017", "rewards");
//! let client = mongodb::connect_from_config(&config).await?;
//! let db = client.database(config.database());
//! ```

pub mod common;

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "mongodb")]
pub mod mongodb;
