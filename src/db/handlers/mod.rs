//! Repository implementations for database access.
//!
//! Each repository wraps a SQLx connection or transaction, provides
//! strongly-typed operations, and returns domain models from
//! [`crate::db::models`]. Repositories created from a transaction inherit its
//! ACID guarantees.

pub mod battle_requests;

pub use battle_requests::BattleRequests;
