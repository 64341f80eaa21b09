//! Shared types for the chainlog service
//!
//! Common types used across crates: the unified error system, the
//! audited log entry model, and the real-time stream message protocol.

pub mod error;
pub mod log;
pub mod stream;

// Re-exports
pub use error::{AppError, AppResult, ErrorCode};
pub use log::LogEntry;
pub use stream::StreamMessage;
