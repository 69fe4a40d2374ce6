//! HTTP handler for the Twitch channel live-status lookup.

use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    AppState,
    api::models::twitch::{StreamStatusQuery, StreamStatusResponse},
    errors::Error,
};

/// Check whether a channel is live
#[utoipa::path(
    get,
    path = "/api/twitch/status",
    params(StreamStatusQuery),
    tag = "twitch",
    responses(
        (status = 200, description = "Live status for the channel", body = StreamStatusResponse),
        (status = 400, description = "No channel given and none configured"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn stream_status(
    State(state): State<AppState>,
    Query(query): Query<StreamStatusQuery>,
) -> Result<Json<StreamStatusResponse>, Error> {
    let Some(twitch) = state.twitch.as_ref() else {
        return Err(Error::Internal {
            operation: "check stream status: Twitch integration is not configured".to_string(),
        });
    };

    let channel = query
        .channel
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| state.config.twitch.channel_name.clone());

    if channel.is_empty() {
        return Err(Error::BadRequest {
            message: "Channel name parameter is required".to_string(),
        });
    }

    let status = twitch.stream_status(&channel).await?;
    Ok(Json(status))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::create_memory_test_app;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn status_without_configured_integration_is_an_error() {
        let app = create_memory_test_app().await;

        let response = app.server.get("/api/twitch/status").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    }
}
