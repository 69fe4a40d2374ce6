//! HTTP request handlers for all API endpoints.
//!
//! Each handler is responsible for request validation, business logic
//! execution via the request store, and response serialization. Handlers
//! return [`crate::errors::Error`] which converts to the appropriate HTTP
//! status code and body.

pub mod battle_requests;
pub mod twitch;
