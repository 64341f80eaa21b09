//! Session token storage
//!
//! Bearer tokens issued at login, persisted with an absolute expiry.
//! Expired sessions are indistinguishable from unknown ones and are
//! deleted lazily on first resolve after expiry.

use super::{StoreError, StoreResult};
use chrono::{DateTime, Duration, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sessions: key = token, value = JSON session record
const SESSIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    subject_id: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Token-to-subject session store sharing the log database
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<Database>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(db: Arc<Database>, ttl_minutes: i64) -> StoreResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SESSIONS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db,
            ttl: Duration::minutes(ttl_minutes),
        })
    }

    /// Create a session for a subject and return its opaque token.
    /// Each call issues a fresh token; existing sessions are untouched.
    pub fn create(&self, subject_id: &str) -> StoreResult<String> {
        let token = generate_token();
        let now = Utc::now();
        let record = SessionRecord {
            subject_id: subject_id.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        let json = serde_json::to_vec(&record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut sessions = write_txn.open_table(SESSIONS_TABLE)?;
            sessions.insert(token.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;

        Ok(token)
    }

    /// Resolve a token to its subject id.
    ///
    /// Returns `None` for unknown and expired tokens alike; expired
    /// records are removed on the way out.
    pub fn resolve(&self, token: &str) -> StoreResult<Option<String>> {
        let record = {
            let read_txn = self.db.begin_read()?;
            let sessions = read_txn.open_table(SESSIONS_TABLE)?;
            match sessions.get(token)? {
                Some(guard) => serde_json::from_slice::<SessionRecord>(guard.value())
                    .map_err(StoreError::from)?,
                None => return Ok(None),
            }
        };

        if record.expires_at <= Utc::now() {
            let write_txn = self.db.begin_write()?;
            {
                let mut sessions = write_txn.open_table(SESSIONS_TABLE)?;
                sessions.remove(token)?;
            }
            write_txn.commit()?;
            return Ok(None);
        }

        Ok(Some(record.subject_id))
    }

    #[cfg(test)]
    fn create_with_ttl(&self, subject_id: &str, ttl: Duration) -> StoreResult<String> {
        let token = generate_token();
        let now = Utc::now();
        let record = SessionRecord {
            subject_id: subject_id.to_string(),
            created_at: now,
            expires_at: now + ttl,
        };
        let json = serde_json::to_vec(&record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut sessions = write_txn.open_table(SESSIONS_TABLE)?;
            sessions.insert(token.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;

        Ok(token)
    }
}

/// 256 bits of CSPRNG output, URL-safe base64 (43 chars, no padding)
fn generate_token() -> String {
    use base64::Engine;
    let mut bytes = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
