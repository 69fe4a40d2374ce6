//! OpenAPI documentation configuration.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::{api, errors::FieldError, scheduling::SlotAvailability};

/// Security scheme for the admin listing endpoint.
struct AdminSecurityAddon;

impl Modify for AdminSecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "AdminKey".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-admin-key",
                    "Static admin key configured via `admin_api_key`. Required for the request listing.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "battlectl",
        description = "Scheduling service and admin approval workflow for streamer battle requests"
    ),
    modifiers(&AdminSecurityAddon),
    paths(
        api::handlers::battle_requests::create_battle_request,
        api::handlers::battle_requests::list_battle_requests,
        api::handlers::battle_requests::get_availability,
        api::handlers::battle_requests::update_status,
        api::handlers::twitch::stream_status,
    ),
    components(schemas(
        api::models::battle_requests::BattleRequestCreate,
        api::models::battle_requests::BattleRequestResponse,
        api::models::battle_requests::StatusUpdateRequest,
        api::models::twitch::StreamStatusResponse,
        api::models::twitch::StreamInfo,
        SlotAvailability,
        FieldError,
    )),
    tags(
        (name = "battle-requests", description = "Battle request submission and approval workflow"),
        (name = "twitch", description = "Twitch live-status integration"),
    )
)]
pub struct ApiDoc;
