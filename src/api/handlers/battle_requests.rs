//! HTTP handlers for battle request submission, availability and approval.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::battle_requests::{AvailabilityQuery, BattleRequestCreate, BattleRequestResponse, StatusUpdateRequest},
    auth::AdminKey,
    db::models::battle_requests::ACTIVE_SLOT_CONSTRAINT,
    errors::Error,
    notifications::NotificationEvent,
    scheduling::{self, SlotAvailability},
};

/// Submit a new battle request
#[utoipa::path(
    post,
    path = "/api/battle-requests",
    request_body = BattleRequestCreate,
    tag = "battle-requests",
    responses(
        (status = 201, description = "Request created, pending approval", body = BattleRequestResponse),
        (status = 400, description = "Invalid submission fields"),
        (status = 409, description = "Slot already holds an active booking"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_battle_request(
    State(state): State<AppState>,
    Json(request): Json<BattleRequestCreate>,
) -> Result<(StatusCode, Json<BattleRequestResponse>), Error> {
    let create_request = request.validate().map_err(|errors| Error::Validation { errors })?;

    let created = match state.store.create(&create_request).await {
        Ok(created) => created,
        Err(err) if err.is_unique_violation_on(ACTIVE_SLOT_CONSTRAINT) => {
            return Err(Error::SlotConflict {
                date: create_request.requested_date,
                time: create_request.requested_time,
            });
        }
        Err(err) => return Err(err.into()),
    };

    // The booking is committed; email delivery must not affect the response.
    state.outbox.enqueue(NotificationEvent::RequestSubmitted { request: created.clone() });

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// List all battle requests (admin)
#[utoipa::path(
    get,
    path = "/api/battle-requests",
    tag = "battle-requests",
    responses(
        (status = 200, description = "All requests, ordered by date then slot", body = [BattleRequestResponse]),
        (status = 401, description = "Missing or invalid admin key"),
    ),
    security(
        ("AdminKey" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_battle_requests(State(state): State<AppState>, _admin: AdminKey) -> Result<Json<Vec<BattleRequestResponse>>, Error> {
    let requests = state.store.list().await?;
    Ok(Json(requests.into_iter().map(BattleRequestResponse::from).collect()))
}

/// Check slot availability for a date
#[utoipa::path(
    get,
    path = "/api/battle-requests/availability",
    params(AvailabilityQuery),
    tag = "battle-requests",
    responses(
        (status = 200, description = "All ten catalog slots, in catalog order", body = [SlotAvailability]),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_availability(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Vec<SlotAvailability>>, Error> {
    // Missing or unparseable date fails open: this check is an advisory UI
    // affordance, not an allocation guarantee. The insert-time unique index
    // is the authoritative guard.
    let Some(date) = query.parsed_date() else {
        tracing::warn!(date = ?query.date, "Availability queried without a usable date, reporting all slots available");
        return Ok(Json(scheduling::all_available()));
    };

    let requests = state.store.list().await?;
    Ok(Json(scheduling::availability_for(date, &requests)))
}

/// Approve or decline a battle request via its token
#[utoipa::path(
    post,
    path = "/api/battle-requests/update-status",
    request_body = StatusUpdateRequest,
    tag = "battle-requests",
    responses(
        (status = 200, description = "Status updated", body = BattleRequestResponse),
        (status = 400, description = "Status is not \"confirmed\" or \"rejected\""),
        (status = 404, description = "No request holds this token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_status(
    State(state): State<AppState>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<BattleRequestResponse>, Error> {
    // Reject bad status values before touching the store.
    let status = request.parsed_status().map_err(|errors| Error::Validation { errors })?;

    let updated = state
        .store
        .update_status(&request.token, status)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "battle request".to_string(),
            id: request.token.clone(),
        })?;

    // Terminal states are idempotent: re-applying re-sends the same email.
    state.outbox.enqueue(NotificationEvent::StatusChanged { request: updated.clone() });

    Ok(Json(updated.into()))
}
