use messaging::BusError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RewardError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Conflict(String),

    /// A business rule refused the operation
    #[error("{0}")]
    BusinessRule(String),

    #[error("Event bus error: {0}")]
    Transport(#[from] BusError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),
}

impl RewardError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn business_rule(message: impl Into<String>) -> Self {
        Self::BusinessRule(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::BusinessRule(_) => "business_rule",
            Self::Transport(_) => "transport",
            Self::Serialization(_) => "serialization",
            Self::Database(_) => "database",
        }
    }
}

pub type RewardResult<T> = Result<T, RewardError>;

impl From<mongodb::error::Error> for RewardError {
    fn from(err: mongodb::error::Error) -> Self {
        RewardError::Database(err.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for RewardError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        RewardError::Database(format!("BSON serialization error: {}", err))
    }
}
