//! SqliteStore: payloads persisted in a SQLite database
//!
//! One row per test in `test_data(test_id, data, created_at)`. Saving
//! upserts the row and refreshes `created_at` (epoch milliseconds), which
//! is what `delete_older_than` compares against.
//!
//! The connection sits behind a `parking_lot::Mutex` so the store can be
//! shared across connection tasks; statements are short and never held
//! across an await point.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use testsync_core::{DataStore, Error, Result, TestId};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS test_data (
        test_id INTEGER PRIMARY KEY,
        data BLOB,
        created_at INTEGER NOT NULL
    )
";

fn storage_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

fn sql_id(test_id: TestId) -> Result<i64> {
    i64::try_from(test_id.as_u64())
        .map_err(|_| Error::Storage(format!("test id {} exceeds SQLite integer range", test_id)))
}

/// SQLite-backed [`DataStore`].
#[derive(Debug)]
pub struct SqliteStore {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the file cannot be opened or the schema
    /// cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(storage_err)?;
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        debug!(target: "testsync::storage", path = ?path, "SQLite store opened");
        Ok(Self {
            path,
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| Error::Storage("store is closed".to_string()))?;
        f(conn).map_err(storage_err)
    }

    fn save_at(&self, test_id: TestId, data: &[u8], saved_at: DateTime<Utc>) -> Result<()> {
        let id = sql_id(test_id)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO test_data (test_id, data, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(test_id) DO UPDATE SET data = excluded.data, created_at = excluded.created_at",
                params![id, data, saved_at.timestamp_millis()],
            )
        })?;
        Ok(())
    }
}

impl DataStore for SqliteStore {
    fn save(&self, test_id: TestId, data: &[u8]) -> Result<()> {
        self.save_at(test_id, data, Utc::now())
    }

    fn load(&self, test_id: TestId) -> Result<Option<Vec<u8>>> {
        let id = sql_id(test_id)?;
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT data FROM test_data WHERE test_id = ?1",
                params![id],
                |row| row.get::<_, Option<Vec<u8>>>(0),
            )
            .optional()
        })
        .map(|row| row.map(Option::unwrap_or_default))
    }

    fn delete(&self, test_id: TestId) -> Result<()> {
        let id = sql_id(test_id)?;
        self.with_conn(|conn| conn.execute("DELETE FROM test_data WHERE test_id = ?1", params![id]))?;
        Ok(())
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM test_data WHERE created_at < ?1",
                params![cutoff.timestamp_millis()],
            )
        })
    }

    fn close(&self) -> Result<()> {
        close_slot(&mut self.conn.lock(), Connection::close).map_err(storage_err)
    }
}

/// Close the connection held in `slot`.
///
/// A connection that refuses to close is put back, so the store stays
/// usable and a later `close` can retry.
fn close_slot<C, E>(
    slot: &mut Option<C>,
    close: impl FnOnce(C) -> std::result::Result<(), (C, E)>,
) -> std::result::Result<(), E> {
    match slot.take() {
        Some(conn) => close(conn).map_err(|(conn, e)| {
            *slot = Some(conn);
            e
        }),
        None => Ok(()),
    }
}
