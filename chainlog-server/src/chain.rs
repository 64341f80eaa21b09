//! Hash-chain engine
//!
//! Computes and verifies the tamper-evident HMAC-SHA256 digest binding
//! each entry's content fields together under the process-wide chain
//! secret. Pure and storage-independent: verification works on the raw
//! stored record so that missing or malformed fields are reported as a
//! structured reason instead of a deserialization failure.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use shared::log::LogEntry;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Result of verifying a stored record against its digest
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub valid: bool,
    pub verification_token: Option<String>,
    pub error: Option<String>,
}

impl Verification {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            verification_token: None,
            error: Some(error.into()),
        }
    }
}

/// Keyed digest engine for log entries
///
/// The key is a process-wide secret and never derived from entry
/// contents, so an attacker who controls entry contents cannot forge a
/// valid digest without it.
#[derive(Clone)]
pub struct ChainSigner {
    secret: Vec<u8>,
}

impl ChainSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Compute the digest over the four content fields, hex-encoded.
    ///
    /// Deterministic: recomputing from the same inputs reproduces the
    /// same value. Fields are joined with `|` over the canonical
    /// microsecond timestamp rendering.
    pub fn digest(
        &self,
        subject_id: &str,
        payload: &str,
        outcome: &str,
        created_at: &DateTime<Utc>,
    ) -> String {
        let data = format!(
            "{subject_id}|{payload}|{outcome}|{}",
            LogEntry::canonical_timestamp(created_at)
        );
        hex::encode(self.mac(data.as_bytes()))
    }

    /// Build a complete sealed entry: fresh id, current timestamp,
    /// digest over the content fields.
    pub fn seal(&self, subject_id: &str, payload: &str, outcome: &str) -> LogEntry {
        let created_at = Utc::now();
        let digest = self.digest(subject_id, payload, outcome, &created_at);
        LogEntry {
            id: Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            payload: payload.to_string(),
            outcome: outcome.to_string(),
            created_at,
            digest,
        }
    }

    /// Token proving a (log id, digest) pair was verified by this
    /// service; returned to callers only for valid entries.
    pub fn verification_token(&self, log_id: &str, digest: &str) -> String {
        let data = format!("{log_id}|{digest}");
        hex::encode(self.mac(data.as_bytes()))
    }

    /// Verify a stored record against its stored digest.
    ///
    /// Operates on the raw JSON so tampering that breaks field types is
    /// reported as a verification failure, never a panic or an error
    /// path. The digest comparison is constant-time.
    pub fn verify_record(&self, record: &serde_json::Value) -> Verification {
        let fields = [
            record.get("subject_id").and_then(|v| v.as_str()),
            record.get("payload").and_then(|v| v.as_str()),
            record.get("outcome").and_then(|v| v.as_str()),
            record.get("created_at").and_then(|v| v.as_str()),
            record.get("digest").and_then(|v| v.as_str()),
        ];
        let [Some(subject_id), Some(payload), Some(outcome), Some(created_at), Some(digest)] =
            fields
        else {
            return Verification::failed("Missing required fields for verification");
        };

        let created_at = match DateTime::parse_from_rfc3339(created_at) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(_) => {
                return Verification::failed("Verification error: invalid created_at timestamp");
            }
        };

        let canonical = format!(
            "{subject_id}|{payload}|{outcome}|{}",
            LogEntry::canonical_timestamp(&created_at)
        );

        // Constant-time comparison via hmac::verify_slice
        let matches = hex::decode(digest)
            .ok()
            .filter(|bytes| {
                let mut mac = HmacSha256::new_from_slice(&self.secret)
                    .expect("HMAC can take key of any size");
                mac.update(canonical.as_bytes());
                mac.verify_slice(bytes).is_ok()
            })
            .is_some();

        if matches {
            let log_id = record.get("id").and_then(|v| v.as_str()).unwrap_or("");
            Verification {
                valid: true,
                verification_token: Some(self.verification_token(log_id, digest)),
                error: None,
            }
        } else {
            Verification::failed("Hash verification failed - log may have been tampered with")
        }
    }

    fn mac(&self, data: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}
