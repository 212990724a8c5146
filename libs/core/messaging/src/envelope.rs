//! Wire envelope carried on every channel.

use crate::error::BusResult;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A published event.
///
/// Serialized as `{id, type, timestamp, correlationId, data}`. The `type`
/// tag is also the name of the channel the envelope travels on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    pub timestamp: DateTime<Utc>,

    /// Ties together every event of one business transaction
    pub correlation_id: String,

    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn decode(payload: &str) -> BusResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn encode(&self) -> BusResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize `data` into a typed payload.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// An envelope before publishing.
///
/// `id` and `timestamp` are filled in by [`crate::EventBus::publish`] when
/// left unset.
#[derive(Debug, Clone)]
pub struct NewEnvelope {
    pub id: Option<String>,
    pub event_type: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub correlation_id: String,
    pub data: Value,
}

impl NewEnvelope {
    pub fn new(
        event_type: impl Into<String>,
        correlation_id: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: None,
            event_type: event_type.into(),
            timestamp: None,
            correlation_id: correlation_id.into(),
            data,
        }
    }

    /// Build from any serializable payload.
    pub fn from_payload<T: Serialize>(
        event_type: impl Into<String>,
        correlation_id: impl Into<String>,
        payload: &T,
    ) -> BusResult<Self> {
        Ok(Self::new(
            event_type,
            correlation_id,
            serde_json::to_value(payload)?,
        ))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Assign the missing id (UUID v4) and timestamp (now).
    pub(crate) fn stamp(self) -> Envelope {
        Envelope {
            id: self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            event_type: self.event_type,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            correlation_id: self.correlation_id,
            data: self.data,
        }
    }
}
