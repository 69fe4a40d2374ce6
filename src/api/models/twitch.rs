//! API request/response models for the Twitch status endpoint.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Query parameters for the channel live-status lookup
#[derive(Debug, Deserialize, IntoParams)]
pub struct StreamStatusQuery {
    /// Channel login to check; defaults to the configured channel
    pub channel: Option<String>,
}

/// Live-status report for a channel
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StreamStatusResponse {
    pub is_live: bool,
    /// Present only while the channel is live
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamInfo>,
}

/// Subset of the Helix stream payload the frontend cares about
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StreamInfo {
    pub id: String,
    pub user_name: String,
    #[serde(default)]
    pub game_name: String,
    pub title: String,
    pub viewer_count: i64,
    pub started_at: String,
    #[serde(default)]
    pub thumbnail_url: String,
}
