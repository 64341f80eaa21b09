//! redb-based storage for log entries and sessions
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `logs` | `id` | JSON | Entry data (append-only until evicted) |
//! | `log_seqs` | `id` | `u64` | Entry's sequence number |
//! | `subject_index` | `(subject_id, seq)` | `id` | Per-subject recency index |
//! | `global_index` | `seq` | `id` | Global recency index |
//! | `counters` | name | `u64` | Sequence + per-index row counts |
//!
//! Both indexes are trimmed to the retention bound on every append. An
//! id trimmed out of both indexes has its data row deleted (evicted).
//! The sequence counter, not wall-clock time, defines append order.

pub mod session;

use crate::bus::{EventBus, LOG_UPDATES_TOPIC};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use shared::log::LogEntry;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Entry data: key = entry id, value = JSON
const LOGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("logs");

/// Entry sequence numbers: key = entry id, value = seq
const LOG_SEQS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("log_seqs");

/// Per-subject index: key = (subject_id, seq), value = entry id
const SUBJECT_INDEX_TABLE: TableDefinition<(&str, u64), &str> =
    TableDefinition::new("subject_index");

/// Global index: key = seq, value = entry id
const GLOBAL_INDEX_TABLE: TableDefinition<u64, &str> = TableDefinition::new("global_index");

/// Counters: "seq" plus per-index row counts ("count:" = global)
const COUNTERS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("counters");

const SEQ_KEY: &str = "seq";
const GLOBAL_COUNT_KEY: &str = "count:";

/// Storage errors — all retriable infrastructure failures from the
/// caller's point of view
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Open (or create) the backing database file
pub fn open_database(path: impl AsRef<Path>) -> StoreResult<Arc<Database>> {
    Ok(Arc::new(Database::create(path)?))
}

/// Open an in-memory database (for testing)
#[cfg(test)]
pub fn open_in_memory() -> StoreResult<Arc<Database>> {
    let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
    Ok(Arc::new(db))
}

/// Append-only log entry storage
///
/// `append` persists the entry, maintains both recency indexes, trims
/// them to the retention bound, and publishes the serialized entry on
/// the event bus after the transaction commits — so a published entry
/// is always retrievable by id and by index.
#[derive(Clone)]
pub struct LogStore {
    db: Arc<Database>,
    retention: u64,
    bus: Arc<dyn EventBus>,
}

impl LogStore {
    pub fn new(db: Arc<Database>, retention: usize, bus: Arc<dyn EventBus>) -> StoreResult<Self> {
        // Initialize tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(LOGS_TABLE)?;
            let _ = write_txn.open_table(LOG_SEQS_TABLE)?;
            let _ = write_txn.open_table(SUBJECT_INDEX_TABLE)?;
            let _ = write_txn.open_table(GLOBAL_INDEX_TABLE)?;
            let _ = write_txn.open_table(COUNTERS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db,
            retention: retention as u64,
            bus,
        })
    }

    /// Persist an entry, index it, trim the indexes, and publish it.
    ///
    /// Ordering: store-by-id happens-before index-insertion (same
    /// transaction) happens-before publish (after commit).
    pub fn append(&self, entry: &LogEntry) -> StoreResult<()> {
        let json = serde_json::to_string(entry)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut logs = write_txn.open_table(LOGS_TABLE)?;
            let mut seqs = write_txn.open_table(LOG_SEQS_TABLE)?;
            let mut subject_index = write_txn.open_table(SUBJECT_INDEX_TABLE)?;
            let mut global_index = write_txn.open_table(GLOBAL_INDEX_TABLE)?;
            let mut counters = write_txn.open_table(COUNTERS_TABLE)?;

            let seq = read_counter(&counters, SEQ_KEY)? + 1;
            counters.insert(SEQ_KEY, seq)?;

            logs.insert(entry.id.as_str(), json.as_bytes())?;
            seqs.insert(entry.id.as_str(), seq)?;
            subject_index.insert((entry.subject_id.as_str(), seq), entry.id.as_str())?;
            global_index.insert(seq, entry.id.as_str())?;

            let subject_count_key = subject_count_key(&entry.subject_id);
            let global_count = read_counter(&counters, GLOBAL_COUNT_KEY)? + 1;
            let subject_count = read_counter(&counters, &subject_count_key)? + 1;
            counters.insert(GLOBAL_COUNT_KEY, global_count)?;
            counters.insert(subject_count_key.as_str(), subject_count)?;

            // Trim the global index to the retention bound
            let mut global_count = global_count;
            while global_count > self.retention {
                let Some((old_seq, old_id)) = first_global(&global_index)? else {
                    break;
                };
                global_index.remove(old_seq)?;
                global_count -= 1;
                counters.insert(GLOBAL_COUNT_KEY, global_count)?;

                // Evict the data row once it left both indexes
                if let Some(subject) = entry_subject(&logs, &old_id)?
                    && subject_index.get((subject.as_str(), old_seq))?.is_none()
                {
                    logs.remove(old_id.as_str())?;
                    seqs.remove(old_id.as_str())?;
                }
            }

            // Trim this subject's index to the retention bound
            let mut subject_count = subject_count;
            while subject_count > self.retention {
                let Some((old_seq, old_id)) = first_for_subject(&subject_index, &entry.subject_id)?
                else {
                    break;
                };
                subject_index.remove((entry.subject_id.as_str(), old_seq))?;
                subject_count -= 1;
                counters.insert(subject_count_key.as_str(), subject_count)?;

                if global_index.get(old_seq)?.is_none() {
                    logs.remove(old_id.as_str())?;
                    seqs.remove(old_id.as_str())?;
                }
            }
        }
        write_txn.commit()?;

        self.bus.publish(LOG_UPDATES_TOPIC, json);
        Ok(())
    }

    /// Get an entry by id
    pub fn get(&self, id: &str) -> StoreResult<Option<LogEntry>> {
        match self.get_raw(id)? {
            Some(raw) => Ok(Some(serde_json::from_value(raw)?)),
            None => Ok(None),
        }
    }

    /// Get the raw stored record by id (for digest verification, which
    /// must see exactly what is stored, tampered or not)
    pub fn get_raw(&self, id: &str) -> StoreResult<Option<serde_json::Value>> {
        let read_txn = self.db.begin_read()?;
        let logs = read_txn.open_table(LOGS_TABLE)?;

        match logs.get(id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// List entries most-recent-first, optionally scoped to one
    /// subject, paginated. Past-the-end reads return an empty vec.
    pub fn list(
        &self,
        subject_filter: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<LogEntry>> {
        let read_txn = self.db.begin_read()?;
        let logs = read_txn.open_table(LOGS_TABLE)?;

        let ids: Vec<String> = match subject_filter {
            Some(subject) => {
                let index = read_txn.open_table(SUBJECT_INDEX_TABLE)?;
                let mut ids = Vec::new();
                for item in index
                    .range((subject, 0)..=(subject, u64::MAX))?
                    .rev()
                    .skip(offset)
                    .take(limit)
                {
                    let (_, id) = item?;
                    ids.push(id.value().to_string());
                }
                ids
            }
            None => {
                let index = read_txn.open_table(GLOBAL_INDEX_TABLE)?;
                let mut ids = Vec::new();
                for item in index
                    .range(0..=u64::MAX)?
                    .rev()
                    .skip(offset)
                    .take(limit)
                {
                    let (_, id) = item?;
                    ids.push(id.value().to_string());
                }
                ids
            }
        };

        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            // Indexed ids always have data rows; eviction removes the
            // index reference first within the same transaction.
            if let Some(guard) = logs.get(id.as_str())? {
                entries.push(serde_json::from_slice(guard.value())?);
            }
        }
        Ok(entries)
    }

    /// Overwrite the raw stored record, bypassing digest computation.
    /// Test-only: simulates out-of-band tampering with stored data.
    #[cfg(test)]
    pub(crate) fn put_raw(&self, id: &str, record: &serde_json::Value) -> StoreResult<()> {
        let json = serde_json::to_vec(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut logs = write_txn.open_table(LOGS_TABLE)?;
            logs.insert(id, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

fn subject_count_key(subject_id: &str) -> String {
    format!("count:{subject_id}")
}

fn read_counter(
    counters: &impl ReadableTable<&'static str, u64>,
    key: &str,
) -> StoreResult<u64> {
    Ok(counters.get(key)?.map(|g| g.value()).unwrap_or(0))
}

fn first_global(
    index: &impl ReadableTable<u64, &'static str>,
) -> StoreResult<Option<(u64, String)>> {
    let mut iter = index.range(0..=u64::MAX)?;
    match iter.next() {
        Some(item) => {
            let (key, value) = item?;
            Ok(Some((key.value(), value.value().to_string())))
        }
        None => Ok(None),
    }
}

fn first_for_subject(
    index: &impl ReadableTable<(&'static str, u64), &'static str>,
    subject: &str,
) -> StoreResult<Option<(u64, String)>> {
    let mut iter = index.range((subject, 0)..=(subject, u64::MAX))?;
    match iter.next() {
        Some(item) => {
            let (key, value) = item?;
            let (_, seq) = key.value();
            Ok(Some((seq, value.value().to_string())))
        }
        None => Ok(None),
    }
}

fn entry_subject(
    logs: &impl ReadableTable<&'static str, &'static [u8]>,
    id: &str,
) -> StoreResult<Option<String>> {
    match logs.get(id)? {
        Some(guard) => {
            let raw: serde_json::Value = serde_json::from_slice(guard.value())?;
            Ok(raw
                .get("subject_id")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()))
        }
        None => Ok(None),
    }
}
