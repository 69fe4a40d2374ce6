//! API request/response models for battle requests.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    db::models::battle_requests::{BattleRequest, BattleRequestCreateDBRequest, RequestStatus},
    errors::FieldError,
    scheduling,
};

/// Public submission payload for a new battle request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BattleRequestCreate {
    pub name: String,
    pub email: String,
    pub twitch_username: String,
    pub game: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Calendar date, `YYYY-MM-DD` or a full ISO-8601 timestamp whose date
    /// portion is used
    pub requested_date: String,
    /// One of the ten bookable slot labels, e.g. "5:00 PM"
    pub requested_time: String,
}

impl BattleRequestCreate {
    /// Validate the submission and convert it into a store create request.
    ///
    /// Collects every field failure instead of stopping at the first, so the
    /// form can surface all of them at once.
    pub fn validate(&self) -> Result<BattleRequestCreateDBRequest, Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "name is required"));
        }
        if self.email.trim().is_empty() {
            errors.push(FieldError::new("email", "email is required"));
        } else if !self.email.contains('@') {
            errors.push(FieldError::new("email", "email must be a valid address"));
        }
        if self.twitch_username.trim().is_empty() {
            errors.push(FieldError::new("twitchUsername", "twitch username is required"));
        }
        if self.game.trim().is_empty() {
            errors.push(FieldError::new("game", "game is required"));
        }

        let requested_date = match parse_requested_date(&self.requested_date) {
            Some(date) => Some(date),
            None => {
                errors.push(FieldError::new(
                    "requestedDate",
                    "requested date must be an ISO date (YYYY-MM-DD)",
                ));
                None
            }
        };

        if !scheduling::is_valid_slot(&self.requested_time) {
            errors.push(FieldError::new("requestedTime", "requested time is not a bookable slot"));
        }

        match (requested_date, errors.is_empty()) {
            (Some(requested_date), true) => Ok(BattleRequestCreateDBRequest {
                name: self.name.trim().to_string(),
                email: self.email.trim().to_string(),
                twitch_username: self.twitch_username.trim().to_string(),
                game: self.game.trim().to_string(),
                notes: self.notes.clone().filter(|n| !n.trim().is_empty()),
                requested_date,
                requested_time: self.requested_time.clone(),
            }),
            _ => Err(errors),
        }
    }
}

/// Parse a submitted date, accepting a bare ISO date or a full timestamp
/// whose UTC date portion is taken.
fn parse_requested_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc).date_naive()))
}

/// Status transition request, authenticated solely by token possession.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusUpdateRequest {
    /// The bearer token from the accept/reject link
    pub token: String,
    /// "confirmed" or "rejected"
    pub status: String,
}

impl StatusUpdateRequest {
    /// Parse the target status, accepting only the two terminal states.
    /// Anything else (including "pending") is rejected before any lookup.
    pub fn parsed_status(&self) -> Result<RequestStatus, Vec<FieldError>> {
        match self.status.as_str() {
            "confirmed" => Ok(RequestStatus::Confirmed),
            "rejected" => Ok(RequestStatus::Rejected),
            _ => Err(vec![FieldError::new("status", "status must be \"confirmed\" or \"rejected\"")]),
        }
    }
}

/// Query parameters for the availability check
#[derive(Debug, Deserialize, IntoParams)]
pub struct AvailabilityQuery {
    /// Calendar date to check, `YYYY-MM-DD`. Missing or unparseable dates
    /// fail open: every slot is reported available.
    pub date: Option<String>,
}

impl AvailabilityQuery {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        self.date.as_deref().and_then(parse_requested_date)
    }
}

/// A battle request as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BattleRequestResponse {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub twitch_username: String,
    pub game: String,
    pub notes: Option<String>,
    pub requested_date: NaiveDate,
    pub requested_time: String,
    pub status: RequestStatus,
    /// Bearer credential for the accept/reject links
    pub token: String,
    pub created_at: DateTime<Utc>,
}

impl From<BattleRequest> for BattleRequestResponse {
    fn from(db: BattleRequest) -> Self {
        Self {
            id: db.id,
            name: db.name,
            email: db.email,
            twitch_username: db.twitch_username,
            game: db.game,
            notes: db.notes,
            requested_date: db.requested_date,
            requested_time: db.requested_time,
            status: db.status,
            token: db.token,
            created_at: db.created_at,
        }
    }
}
