//! Database models for battle requests.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Name of the partial unique index that keeps at most one active request per
/// `(requested_date, requested_time)` pair. Unique violations carrying this
/// constraint name are surfaced to callers as a slot conflict.
pub const ACTIVE_SLOT_CONSTRAINT: &str = "battle_requests_active_slot_idx";

/// Lifecycle state of a battle request.
///
/// `Pending` is the only initial state. `Confirmed` and `Rejected` are
/// terminal; re-applying a terminal state is accepted and simply re-writes the
/// same value (and re-sends the corresponding email).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "request_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl RequestStatus {
    /// Whether a request in this status occupies its `(date, time)` slot.
    pub fn occupies_slot(self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Confirmed | RequestStatus::Rejected)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Confirmed => write!(f, "confirmed"),
            RequestStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Database entity model
#[derive(Debug, Clone, FromRow)]
pub struct BattleRequest {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub twitch_username: String,
    pub game: String,
    pub notes: Option<String>,
    pub requested_date: NaiveDate,
    pub requested_time: String,
    pub status: RequestStatus,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// Request for creating a battle request. The store assigns `id`, `status`
/// (always pending), `token` and `created_at`.
#[derive(Debug, Clone)]
pub struct BattleRequestCreateDBRequest {
    pub name: String,
    pub email: String,
    pub twitch_username: String,
    pub game: String,
    pub notes: Option<String>,
    pub requested_date: NaiveDate,
    pub requested_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_and_confirmed_occupy_slots() {
        assert!(RequestStatus::Pending.occupies_slot());
        assert!(RequestStatus::Confirmed.occupies_slot());
        assert!(!RequestStatus::Rejected.occupies_slot());
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Confirmed.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RequestStatus::Pending).unwrap(), "\"pending\"");
        assert_eq!(serde_json::to_string(&RequestStatus::Confirmed).unwrap(), "\"confirmed\"");
        assert_eq!(serde_json::to_string(&RequestStatus::Rejected).unwrap(), "\"rejected\"");
    }
}
