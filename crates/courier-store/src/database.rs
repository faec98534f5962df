//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation.

use std::cell::Cell;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::Result;
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`].
///
/// Also tracks the newest `created_at` handed out so that timestamps are
/// strictly increasing even when the wall clock stalls or steps back.
pub struct Database {
    conn: Connection,
    last_created_at: Cell<i64>,
}

impl Database {
    /// Open (or create) a database at an explicit path.
    ///
    /// The parent directory is created if missing.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::init(conn)
    }

    /// Open a private in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        migrations::run_migrations(&conn)?;

        let last: Option<i64> =
            conn.query_row("SELECT MAX(created_at) FROM messages", [], |row| row.get(0))?;

        Ok(Self {
            conn,
            last_created_at: Cell::new(last.unwrap_or(i64::MIN)),
        })
    }

    /// Bound how long a write waits on a locked database before failing.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Pick the `created_at` (µs since epoch) for a message being inserted.
    ///
    /// Caller-supplied timestamps are kept as-is; otherwise the result is
    /// `max(now, last + 1µs)`.
    pub(crate) fn next_created_at(&self, requested: Option<DateTime<Utc>>) -> i64 {
        let last = self.last_created_at.get();
        let ts = match requested {
            Some(ts) => ts.timestamp_micros(),
            None => Utc::now().timestamp_micros().max(last.saturating_add(1)),
        };
        self.last_created_at.set(last.max(ts));
        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");

        Database::open_at(&path).expect("should open");
        assert!(path.exists());
    }

    #[test]
    fn created_at_is_strictly_increasing() {
        let db = Database::open_in_memory().unwrap();
        let mut prev = db.next_created_at(None);
        for _ in 0..1000 {
            let next = db.next_created_at(None);
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn created_at_survives_clock_behind_stored_rows() {
        let db = Database::open_in_memory().unwrap();
        let future = Utc::now() + chrono::Duration::hours(1);
        let pinned = db.next_created_at(Some(future));
        assert_eq!(pinned, future.timestamp_micros());

        let next = db.next_created_at(None);
        assert_eq!(next, pinned + 1);
    }
}
