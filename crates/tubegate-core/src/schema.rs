//! SQLite schema for the approval store.
//!
//! Tables:
//! - `approvals`: one row per approved identifier (upserted on re-approval)

/// DDL for the approval store.
///
/// Schema version: 1
pub const APPROVAL_SCHEMA: &str = r#"
-- Approved identifiers. Timestamps are fixed-width RFC 3339 UTC strings so
-- lexical order matches chronological order.
CREATE TABLE IF NOT EXISTS approvals (
    identifier   TEXT PRIMARY KEY,
    label        TEXT,
    requester    TEXT,
    expires_at   TEXT,
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_approvals_created_at
    ON approvals(created_at);
CREATE INDEX IF NOT EXISTS idx_approvals_expires_at
    ON approvals(expires_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_valid_sql() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(APPROVAL_SCHEMA).unwrap();
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(APPROVAL_SCHEMA).unwrap();
        conn.execute_batch(APPROVAL_SCHEMA).unwrap();
    }
}
