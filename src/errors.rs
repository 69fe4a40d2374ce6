use crate::db::errors::DbError;
use crate::db::models::battle_requests::ACTIVE_SLOT_CONSTRAINT;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use utoipa::ToSchema;

/// A single field-level validation failure.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Submitted data failed field-level validation; nothing was mutated
    #[error("Validation failed")]
    Validation { errors: Vec<FieldError> },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// The requested slot already holds an active booking for that date
    #[error("Time slot {time} on {date} is already booked")]
    SlotConflict { date: NaiveDate, time: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::SlotConflict { .. } => StatusCode::CONFLICT,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::Validation { .. } => "Validation failed".to_string(),
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => {
                format!("{resource} with ID {id} not found")
            }
            Error::SlotConflict { date, time } => {
                format!("The {time} slot on {date} is already booked. Please pick another time.")
            }
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { constraint, .. } => match constraint.as_deref() {
                    Some(ACTIVE_SLOT_CONSTRAINT) => "This time slot is already booked for the requested date".to_string(),
                    _ => "Resource already exists".to_string(),
                },
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::SlotConflict { .. } => {
                tracing::warn!("Slot conflict: {}", self);
            }
            Error::Unauthenticated { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::Validation { .. } | Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            // Validation failures carry field-level detail as structured JSON
            Error::Validation { errors } => {
                use serde_json::json;
                let body = json!({
                    "message": "Validation failed",
                    "errors": errors,
                });
                (status, axum::response::Json(body)).into_response()
            }
            // Slot conflicts identify the contested slot so the client can re-query availability
            Error::SlotConflict { date, time } => {
                use serde_json::json;
                let body = json!({
                    "message": self.user_message(),
                    "date": date,
                    "time": time,
                });
                (status, axum::response::Json(body)).into_response()
            }
            _ => {
                // For all other errors, return simple text message
                let user_message = self.user_message();
                (status, user_message).into_response()
            }
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let err = Error::Validation {
            errors: vec![FieldError::new("requestedTime", "not a bookable slot")],
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn slot_conflict_maps_to_conflict() {
        let err = Error::SlotConflict {
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            time: "5:00 PM".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(err.user_message().contains("5:00 PM"));
    }

    #[test]
    fn active_slot_unique_violation_has_friendly_message() {
        let err = Error::Database(DbError::UniqueViolation {
            constraint: Some(ACTIVE_SLOT_CONSTRAINT.to_string()),
            table: Some("battle_requests".to_string()),
            message: "duplicate key value".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(err.user_message().contains("already booked"));
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = Error::Internal {
            operation: "connect to something private".to_string(),
        };
        assert_eq!(err.user_message(), "Internal server error");
    }
}
