//! Redis connector
//!
//! Commands go through a [`ConnectionManager`]; pub/sub needs its own
//! dedicated connection, so [`open_client`] hands out the raw [`Client`].

mod config;
mod connector;
mod health;

pub use config::RedisConfig;
pub use connector::{
    connect, connect_from_config, connect_from_config_with_retry, connect_with_retry, open_client,
};
pub use health::check_health;

pub use redis::aio::ConnectionManager;
pub use redis::{Client, RedisResult};
