//! Audited log entry model
//!
//! A [`LogEntry`] is immutable once written: the digest binds all four
//! content fields together under the process-wide chain secret, so any
//! later mutation is detectable by recomputing the digest.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One audited action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique identifier (UUID v4), generated at creation
    pub id: String,
    /// Identity of the actor that produced the entry
    pub subject_id: String,
    /// Free-form description of the action performed
    pub payload: String,
    /// Coarse result classifier (e.g. "SUCCESS" / "ERROR")
    pub outcome: String,
    /// Creation timestamp (RFC 3339 on the wire)
    pub created_at: DateTime<Utc>,
    /// HMAC-SHA256 over (subject_id, payload, outcome, created_at), hex
    pub digest: String,
}

impl LogEntry {
    /// Canonical timestamp rendering used for digest computation.
    ///
    /// Truncates to microseconds so that a timestamp parsed back from
    /// its serialized form produces the same digest input.
    pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_timestamp_is_stable_across_serde_roundtrip() {
        let now = Utc::now();
        let canonical = LogEntry::canonical_timestamp(&now);

        let json = serde_json::to_string(&now).unwrap();
        let parsed: DateTime<Utc> = serde_json::from_str(&json).unwrap();
        assert_eq!(LogEntry::canonical_timestamp(&parsed), canonical);
    }

    #[test]
    fn entry_serializes_with_rfc3339_timestamp() {
        let entry = LogEntry {
            id: "e1".into(),
            subject_id: "alice".into(),
            payload: "SELECT * FROM t".into(),
            outcome: "SUCCESS".into(),
            created_at: Utc::now(),
            digest: "ab".repeat(32),
        };
        let value = serde_json::to_value(&entry).unwrap();
        let ts = value["created_at"].as_str().unwrap();
        assert!(ts.ends_with('Z') || ts.contains('+'));
        assert_eq!(value["digest"].as_str().unwrap().len(), 64);
    }
}
