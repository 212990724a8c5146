use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Kind of reward granted by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardType {
    Point,
    Item,
    Coupon,
}

/// Lifecycle of a reward request
///
/// `Pending` moves exactly once to `Approved` or `Rejected`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Statuses that block another claim for the same user and event
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

/// A promotional event with an eligibility window
///
/// The saga only reads events; they are managed elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier (stored as _id in MongoDB)
    #[serde(rename = "_id", alias = "id")]
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Free-text eligibility condition shown to users
    #[serde(default)]
    pub condition: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Event {
    /// Active event running from `start_date` to `end_date`
    pub fn new(title: impl Into<String>, start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            title: title.into(),
            description: String::new(),
            condition: String::new(),
            start_date,
            end_date,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// Whether `now` falls inside the window, both ends included
    pub fn is_in_progress(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now <= self.end_date
    }
}

/// A reward attached to an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    #[serde(rename = "_id", alias = "id")]
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub reward_type: RewardType,
    pub amount: u32,
}

impl Reward {
    pub fn new(event_id: Uuid, name: impl Into<String>, reward_type: RewardType, amount: u32) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_id,
            name: name.into(),
            description: String::new(),
            reward_type,
            amount,
        }
    }
}

/// A user's claim on an event's reward
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardRequest {
    #[serde(rename = "_id", alias = "id")]
    pub id: Uuid,
    /// Opaque id issued by the auth service
    pub user_id: String,
    pub event_id: Uuid,
    pub status: RequestStatus,
    /// Why the request settled the way it did
    #[serde(default)]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RewardRequest {
    pub fn pending(user_id: impl Into<String>, event_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            event_id,
            status: RequestStatus::Pending,
            reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a terminal transition; no-op unless still pending
    pub(crate) fn settle(&mut self, status: RequestStatus, reason: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.reason = reason;
        self.updated_at = Utc::now();
        true
    }
}

/// Filter for listing reward requests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewardRequestFilter {
    pub user_id: Option<String>,
    pub event_id: Option<Uuid>,
    pub status: Option<RequestStatus>,
}

impl RewardRequestFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn with_event(mut self, event_id: Uuid) -> Self {
        self.event_id = Some(event_id);
        self
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, request: &RewardRequest) -> bool {
        self.user_id.as_ref().is_none_or(|u| *u == request.user_id)
            && self.event_id.is_none_or(|e| e == request.event_id)
            && self.status.is_none_or(|s| s == request.status)
    }
}

/// Synchronous answer to a claim, before fulfillment settles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub request_id: Uuid,
    pub status: RequestStatus,
    pub message: String,
}

pub(crate) const CLAIM_ACCEPTED: &str = "Reward request accepted and is being processed";

impl From<&RewardRequest> for ClaimResponse {
    fn from(request: &RewardRequest) -> Self {
        Self {
            request_id: request.id,
            status: request.status,
            message: CLAIM_ACCEPTED.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(RequestStatus::Pending.to_string(), "PENDING");
        assert_eq!(
            serde_json::to_string(&RequestStatus::Approved).unwrap(),
            "\"APPROVED\""
        );
        assert_eq!(
            RequestStatus::from_str("REJECTED").unwrap(),
            RequestStatus::Rejected
        );
        assert_eq!(RewardType::Coupon.to_string(), "COUPON");
    }

    #[test]
    fn test_status_predicates() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());

        assert!(RequestStatus::Pending.is_active());
        assert!(RequestStatus::Approved.is_active());
        assert!(!RequestStatus::Rejected.is_active());
    }

    #[test]
    fn test_window_is_inclusive() {
        let start = Utc::now();
        let end = start + Duration::hours(1);
        let event = Event::new("Launch week", start, end);

        assert!(event.is_in_progress(start));
        assert!(event.is_in_progress(end));
        assert!(!event.is_in_progress(start - Duration::milliseconds(1)));
        assert!(!event.is_in_progress(end + Duration::milliseconds(1)));
    }

    #[test]
    fn test_settle_only_once() {
        let mut request = RewardRequest::pending("u1", Uuid::now_v7());

        assert!(request.settle(RequestStatus::Rejected, Some("late".into())));
        assert!(!request.settle(RequestStatus::Approved, None));
        assert_eq!(request.status, RequestStatus::Rejected);
        assert_eq!(request.reason.as_deref(), Some("late"));
    }

    #[test]
    fn test_filter_matches() {
        let event_id = Uuid::now_v7();
        let request = RewardRequest::pending("u1", event_id);

        assert!(RewardRequestFilter::default().matches(&request));
        assert!(RewardRequestFilter::for_user("u1").with_event(event_id).matches(&request));
        assert!(!RewardRequestFilter::for_user("u2").matches(&request));
        assert!(
            !RewardRequestFilter::default()
                .with_status(RequestStatus::Approved)
                .matches(&request)
        );
    }

    #[test]
    fn test_reward_serializes_type_field() {
        let reward = Reward::new(Uuid::now_v7(), "Welcome points", RewardType::Point, 100);
        let value = serde_json::to_value(&reward).unwrap();

        assert_eq!(value["type"], "POINT");
        assert_eq!(value["amount"], 100);
        assert!(value.get("_id").is_some());
    }

    #[test]
    fn test_claim_response_wire_format() {
        let request = RewardRequest::pending("u1", Uuid::now_v7());
        let value = serde_json::to_value(ClaimResponse::from(&request)).unwrap();

        assert_eq!(value["requestId"], request.id.to_string());
        assert_eq!(value["status"], "PENDING");
        assert_eq!(
            value["message"],
            "Reward request accepted and is being processed"
        );
    }
}
