//! Database migrations

use crate::error::LocalStoreError;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<(), LocalStoreError> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32, LocalStoreError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Migration to version 1: notes and per-owner sync cursors
fn migrate_v1(conn: &mut Connection) -> Result<(), LocalStoreError> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS notes (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            tombstone INTEGER NOT NULL DEFAULT 0,
            sync_state TEXT NOT NULL CHECK (sync_state IN ('dirty', 'synced'))
        );
        CREATE INDEX IF NOT EXISTS idx_notes_owner_state ON notes(owner_id, sync_state);
        CREATE INDEX IF NOT EXISTS idx_notes_owner_updated ON notes(owner_id, updated_at DESC);
        CREATE TABLE IF NOT EXISTS sync_cursors (
            owner_id TEXT PRIMARY KEY,
            cursor INTEGER NOT NULL
        );
        INSERT INTO schema_version (version) VALUES (1);",
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: bounded retry bookkeeping for rejected pushes
fn migrate_v2(conn: &mut Connection) -> Result<(), LocalStoreError> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "ALTER TABLE notes ADD COLUMN rejections INTEGER NOT NULL DEFAULT 0;
         ALTER TABLE notes ADD COLUMN last_error TEXT;
         INSERT INTO schema_version (version) VALUES (2);",
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
