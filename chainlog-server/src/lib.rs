//! chainlog-server — tamper-evident audit log service
//!
//! Accepts structured log entries from authenticated callers, seals
//! each with a keyed HMAC-SHA256 digest, persists it in redb, fans it
//! out live over WebSocket, and anchors digests to an external ledger
//! in the background.

pub mod anchor;
pub mod api;
pub mod auth;
pub mod bus;
pub mod chain;
pub mod config;
pub mod error;
pub mod hub;
pub mod state;
pub mod store;

#[cfg(test)]
mod e2e;
