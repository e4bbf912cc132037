//! Database connection management

use crate::error::LocalStoreError;
use rusqlite::Connection;
use std::path::Path;

use super::migrations;

/// Owns the `SQLite` connection backing the local store
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LocalStoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let mut database = Self { conn };
        database.configure()?;
        database.migrate()?;
        tracing::debug!(path = %path.display(), "Opened local database");
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self, LocalStoreError> {
        let conn = Connection::open_in_memory()?;
        let mut database = Self { conn };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Configure `SQLite` for durable local writes
    fn configure(&self) -> Result<(), LocalStoreError> {
        // WAL is not available for in-memory databases; ignore the result there
        self.conn
            .query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))
            .ok();
        self.conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Run database migrations
    fn migrate(&mut self) -> Result<(), LocalStoreError> {
        migrations::run(&mut self.conn)
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Get a mutable reference, needed to open transactions
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        let value: i32 = db
            .connection()
            .query_row("SELECT 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(value, 1);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("tidemark.db");

        Database::open(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_open_rejects_non_database_file() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("garbage.db");
        std::fs::write(&db_path, vec![0x42_u8; 4096]).unwrap();

        let error = Database::open(&db_path).err().unwrap();
        assert!(matches!(error, LocalStoreError::Corrupted(_)));
    }
}
