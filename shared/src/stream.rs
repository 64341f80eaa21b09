//! Real-time stream message protocol
//!
//! Messages pushed over the WebSocket endpoints. Live entry pushes are
//! bare [`LogEntry`] objects (same shape as the write response); the
//! typed messages below carry a `type` tag.

use crate::log::LogEntry;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Typed messages sent to stream subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Initial snapshot for `/ws/logs` (with pagination metadata)
    LogsResponse {
        subject_filter: Option<String>,
        limit: usize,
        offset: usize,
        count: usize,
        logs: Vec<LogEntry>,
    },
    /// Initial snapshot for `/ws/stream` (recent entries only)
    InitialLogs {
        count: usize,
        subject_filter: Option<String>,
        logs: Vec<LogEntry>,
    },
    /// Periodic liveness signal carrying the open connection count
    Heartbeat {
        timestamp: DateTime<Utc>,
        active_connections: usize,
    },
}
