//! Saga events and their payloads.
//!
//! Each event travels on the channel named after its type tag. Payloads use
//! camelCase on the wire.

use crate::models::RewardType;
use messaging::{BusResult, NewEnvelope};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// The three channels of the reward saga
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum RewardEventType {
    #[strum(serialize = "reward.requested")]
    Requested,
    #[strum(serialize = "reward.processed")]
    Processed,
    #[strum(serialize = "reward.failed")]
    Failed,
}

impl RewardEventType {
    pub const ALL: [Self; 3] = [Self::Requested, Self::Processed, Self::Failed];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "reward.requested",
            Self::Processed => "reward.processed",
            Self::Failed => "reward.failed",
        }
    }
}

/// A typed saga payload that knows its channel
pub trait RewardEvent: Serialize + DeserializeOwned {
    const EVENT_TYPE: RewardEventType;

    fn request_id(&self) -> Uuid;

    /// Envelope id; deterministic so redeliveries of the same outcome share it
    fn envelope_id(&self) -> String;

    /// Envelope correlated to the request; id and timestamp are stamped on publish
    fn to_envelope(&self, correlation_id: &str) -> BusResult<NewEnvelope> {
        Ok(
            NewEnvelope::from_payload(Self::EVENT_TYPE.as_str(), correlation_id, self)?
                .with_id(self.envelope_id()),
        )
    }
}

/// A claim was accepted and persisted as PENDING
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRequested {
    pub user_id: String,
    pub event_id: Uuid,
    pub request_id: Uuid,
}

impl RewardEvent for RewardRequested {
    const EVENT_TYPE: RewardEventType = RewardEventType::Requested;

    fn request_id(&self) -> Uuid {
        self.request_id
    }

    fn envelope_id(&self) -> String {
        self.request_id.to_string()
    }
}

/// Eligibility re-checked and a reward selected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardProcessed {
    pub user_id: String,
    pub event_id: Uuid,
    pub request_id: Uuid,
    pub reward_type: RewardType,
    pub reward_amount: u32,
}

impl RewardProcessed {
    /// Reason recorded on the approved request
    pub fn reason(&self) -> String {
        format!("{} {} granted", self.reward_type, self.reward_amount)
    }
}

impl RewardEvent for RewardProcessed {
    const EVENT_TYPE: RewardEventType = RewardEventType::Processed;

    fn request_id(&self) -> Uuid {
        self.request_id
    }

    fn envelope_id(&self) -> String {
        format!("{}-processed", self.request_id)
    }
}

/// Fulfillment refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardFailed {
    pub user_id: String,
    pub event_id: Uuid,
    pub request_id: Uuid,
    pub reason: String,
}

impl RewardEvent for RewardFailed {
    const EVENT_TYPE: RewardEventType = RewardEventType::Failed;

    fn request_id(&self) -> Uuid {
        self.request_id
    }

    fn envelope_id(&self) -> String {
        format!("{}-failed", self.request_id)
    }
}
