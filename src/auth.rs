//! Admin endpoint authentication.
//!
//! The original deployment sat behind a session-authenticated admin UI; here
//! the admin surface is a single listing endpoint guarded by a static key
//! carried in the `x-admin-key` header. The public approve/reject action is
//! deliberately NOT behind this: its only credential is the per-request token
//! (magic-link pattern).

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{AppState, errors::Error};

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Extractor that rejects the request unless it carries the configured admin
/// key. Endpoints with no configured key reject everything.
pub struct AdminKey;

impl FromRequestParts<AppState> for AdminKey {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin_api_key.as_deref() else {
            return Err(Error::Unauthenticated {
                message: Some("Admin access is not configured".to_string()),
            });
        };

        let provided = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::Unauthenticated {
                message: Some("Missing admin key".to_string()),
            })?;

        if provided != expected {
            return Err(Error::Unauthenticated {
                message: Some("Invalid admin key".to_string()),
            });
        }

        Ok(AdminKey)
    }
}
