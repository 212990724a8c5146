//! Saga counters, emitted through the `metrics` facade.

use metrics::counter;

use crate::models::RequestStatus;

/// Outcome of a claim: `accepted` or the error kind
pub(crate) fn claim(outcome: &'static str) {
    counter!("reward_claims_total", "outcome" => outcome).increment(1);
}

/// Fulfillment decision taken by the requested handler
pub(crate) fn evaluated(outcome: &'static str) {
    counter!("reward_evaluations_total", "outcome" => outcome).increment(1);
}

pub(crate) fn settled(status: RequestStatus) {
    counter!("reward_requests_settled_total", "status" => status.to_string()).increment(1);
}

/// Outcome event for a request that was missing or already terminal
pub(crate) fn ignored(reason: &'static str) {
    counter!("reward_outcomes_ignored_total", "reason" => reason).increment(1);
}
