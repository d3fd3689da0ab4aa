//! Entry store: SQLite-backed approval records.
//!
//! Provides:
//! - Upsert by identifier (last writer wins, `created_at` kept)
//! - Idempotent removal
//! - Point-in-time snapshots, most recently created first

use crate::error::StorageError;
use crate::schema::APPROVAL_SCHEMA;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A stored approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalRecord {
    pub identifier: String,
    pub label: Option<String>,
    pub requester: Option<String>,
    /// `None` means the approval never expires.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalRecord {
    /// Active iff it never expires or expires strictly after `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at > now,
        }
    }
}

/// Fields written by an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApproval {
    pub identifier: String,
    pub label: Option<String>,
    pub requester: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Persistence boundary consumed by the reconciliation engine.
///
/// Implementations must make `upsert`/`remove` atomic per identifier and
/// `snapshot` a consistent point-in-time view.
pub trait EntryStore: Send + Sync {
    /// Insert or replace the record for `approval.identifier`. `now` becomes
    /// `created_at` when the identifier is new.
    fn upsert(
        &self,
        approval: &NewApproval,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRecord, StorageError>;

    /// Delete the record. Returns whether a row was removed.
    fn remove(&self, identifier: &str) -> Result<bool, StorageError>;

    /// All records, most recently created first.
    fn snapshot(&self) -> Result<Vec<ApprovalRecord>, StorageError>;

    fn get(&self, identifier: &str) -> Result<Option<ApprovalRecord>, StorageError>;

    /// Delete records whose expiry is at or before `now`.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StorageError>;
}

/// SQLite-backed approval store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_COLUMNS: &str = "identifier, label, requester, expires_at, created_at";

impl SqliteStore {
    /// Open a file-backed store, creating the schema if needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an existing store for inspection. Fails if `path` does not exist;
    /// nothing is created and writes are refused.
    pub fn open_read_only(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_connection(conn: &Connection) -> Result<(), StorageError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL mode for file-backed DBs (no-op for in-memory)
        let _ = conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()));
        conn.execute_batch(APPROVAL_SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Number of stored records, active or not.
    pub fn count(&self) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM approvals", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl EntryStore for SqliteStore {
    fn upsert(
        &self,
        approval: &NewApproval,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRecord, StorageError> {
        let conn = self.lock()?;

        // Single statement: no reader can observe a half-updated row.
        let raw = conn.query_row(
            &format!(
                r#"
                INSERT INTO approvals (identifier, label, requester, expires_at, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(identifier) DO UPDATE SET
                    label = excluded.label,
                    requester = excluded.requester,
                    expires_at = excluded.expires_at
                RETURNING {SELECT_COLUMNS}
                "#
            ),
            params![
                approval.identifier,
                approval.label,
                approval.requester,
                approval.expires_at.map(format_ts),
                format_ts(now),
            ],
            RawRecord::from_row,
        )?;

        raw.decode()
    }

    fn remove(&self, identifier: &str) -> Result<bool, StorageError> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM approvals WHERE identifier = ?1", [identifier])?;
        Ok(n > 0)
    }

    fn snapshot(&self) -> Result<Vec<ApprovalRecord>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM approvals ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
            .query_map([], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawRecord::decode).collect()
    }

    fn get(&self, identifier: &str) -> Result<Option<ApprovalRecord>, StorageError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM approvals WHERE identifier = ?1"),
                [identifier],
                RawRecord::from_row,
            )
            .optional()?;

        raw.map(RawRecord::decode).transpose()
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM approvals WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            [format_ts(now)],
        )?;
        Ok(n)
    }
}

/// Row as stored, before timestamp decoding.
struct RawRecord {
    identifier: String,
    label: Option<String>,
    requester: Option<String>,
    expires_at: Option<String>,
    created_at: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            identifier: row.get(0)?,
            label: row.get(1)?,
            requester: row.get(2)?,
            expires_at: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn decode(self) -> Result<ApprovalRecord, StorageError> {
        let expires_at = self
            .expires_at
            .as_deref()
            .map(|s| parse_ts(&self.identifier, "expires_at", s))
            .transpose()?;
        let created_at = parse_ts(&self.identifier, "created_at", &self.created_at)?;

        Ok(ApprovalRecord {
            identifier: self.identifier,
            label: self.label,
            requester: self.requester,
            expires_at,
            created_at,
        })
    }
}

fn format_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(identifier: &str, field: &str, s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt {
            identifier: identifier.to_string(),
            message: format!("invalid {field} timestamp {s:?}: {e}"),
        })
}
