use core_config::{ConfigError, FromEnv, env_parse};
use database::mongodb::MongoConfig;
use database::redis::RedisConfig;

/// Worker settings, composed from the connector configs
#[derive(Clone, Debug)]
pub struct Config {
    pub redis: RedisConfig,
    pub mongo: MongoConfig,
    /// Prometheus scrape port (`METRICS_PORT`, default 9464)
    pub metrics_port: u16,
}

impl FromEnv for Config {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            redis: RedisConfig::from_env()?,
            mongo: MongoConfig::from_env()?,
            metrics_port: env_parse("METRICS_PORT", 9464)?,
        })
    }
}
