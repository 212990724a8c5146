//! Error types for the event bus and its handlers.

use thiserror::Error;

/// Errors surfaced by [`crate::EventBus`] operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The transport refused or failed an operation
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Envelope could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The bus has been shut down
    #[error("event bus is closed")]
    Closed,

    /// The transport's inbound stream ended; nothing is delivered anymore
    #[error("event bus lost its transport stream")]
    Disconnected,
}

impl BusError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for BusError {
    fn from(err: redis::RedisError) -> Self {
        Self::transport_with_source("redis", err)
    }
}

pub type BusResult<T> = Result<T, BusError>;

/// Error returned by an [`crate::EventHandler`].
///
/// The bus only logs these; a handler that needs a compensating action must
/// take it itself (usually by publishing another event).
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The envelope's `data` did not match what the handler expects
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            source: None,
        }
    }

    pub fn failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Failed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Failed { .. } => "failed",
        }
    }
}
