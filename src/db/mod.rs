//! SQLite-backed persistence for the governance engine.
//!
//! The engine owns a single writer connection in WAL mode. Nested structures
//! (decisions, archive snapshots, allow/deny lists) are stored as JSON text
//! columns; the visibility predicate reaches into them with `json_each`.

use std::path::PathBuf;

use rusqlite::Connection;

pub mod types;
pub use types::*;

pub mod archives;
pub mod meetings;
pub mod minutes;
pub mod notifications;
pub mod rooms;

pub struct GovDb {
    conn: Connection,
}

impl GovDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Open (or create) a database at `path` and apply the schema.
    pub fn open(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL for concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<DbError>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(DbError::from)?;
        match f(self) {
            Ok(val) => {
                self.conn
                    .execute_batch("COMMIT")
                    .map_err(DbError::from)?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }
}

// =============================================================================
// Shared test utilities
// =============================================================================

#[cfg(test)]
pub mod test_utils {
    use super::GovDb;

    /// Create a temporary database for testing.
    ///
    /// We leak the `TempDir` so the directory persists for the duration of
    /// the test; test temp dirs are cleaned up by the OS.
    pub fn test_db() -> GovDb {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test.db");
        std::mem::forget(dir);
        GovDb::open(path).expect("Failed to open test database")
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::test_db;
    use super::*;

    #[test]
    fn test_open_creates_tables() {
        let db = test_db();
        for table in [
            "meeting_rooms",
            "meetings",
            "meeting_attendees",
            "minutes",
            "minutes_votes",
            "notifications",
            "archives",
            "archive_sync_log",
        ] {
            let count: i64 = db
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .unwrap_or_else(|_| panic!("{table} table should exist"));
            assert_eq!(count, 0);
        }
    }

    #[test]
    fn test_idempotent_schema_application() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("idempotent.db");

        let _db1 = GovDb::open(path.clone()).expect("first open");
        let _db2 = GovDb::open(path).expect("second open should not fail");
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = test_db();
        let result: Result<(), DbError> = db.with_transaction(|db| {
            db.conn_ref().execute(
                "INSERT INTO meeting_rooms (id, name, capacity, created_at)
                 VALUES ('r1', 'Blue Room', 8, '2025-01-01T00:00:00+00:00')",
                [],
            )?;
            Err(DbError::Migration("forced failure".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM meeting_rooms", [], |row| row.get(0))
            .expect("query");
        assert_eq!(count, 0, "insert should have been rolled back");
    }
}
