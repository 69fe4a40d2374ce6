//! Database record structures matching table schemas.

pub mod battle_requests;
