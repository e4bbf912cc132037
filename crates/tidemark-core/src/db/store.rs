//! Local note store: the durable cache every mutation lands in first.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::Database;
use crate::error::LocalStoreError;
use crate::models::{NoteId, NoteRecord, OwnerId, SyncState};

/// Result type for local store operations
pub type StoreResult<T> = std::result::Result<T, LocalStoreError>;

const NOTE_COLUMNS: &str = "id, owner_id, title, body, tags, created_at, updated_at, tombstone, \
                            sync_state, rejections, last_error";

/// Durable, queryable persistence of notes and per-owner sync cursors.
///
/// Implementations serialize writers; a reader never observes a partially
/// written record and a failed write leaves the previous value intact.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Insert or overwrite a record by id
    async fn put(&self, record: &NoteRecord) -> StoreResult<()>;

    /// Overwrite only if the stored `updated_at` still equals `expected`
    /// (`None` meaning no row may exist). Returns whether the write happened.
    async fn put_if_unchanged(
        &self,
        record: &NoteRecord,
        expected: Option<i64>,
    ) -> StoreResult<bool>;

    /// Fetch a record by id, tombstones included
    async fn get(&self, id: &NoteId) -> StoreResult<Option<NoteRecord>>;

    /// Non-tombstoned records for the owner, most recently updated first
    async fn list_active(&self, owner: &OwnerId) -> StoreResult<Vec<NoteRecord>>;

    /// Dirty records for the owner, oldest change first
    async fn list_dirty(&self, owner: &OwnerId) -> StoreResult<Vec<NoteRecord>>;

    /// Case-insensitive substring search over active records
    async fn search(
        &self,
        owner: &OwnerId,
        query: &str,
        limit: usize,
    ) -> StoreResult<Vec<NoteRecord>>;

    /// Timestamp of the latest pulled remote change; 0 when never synced
    async fn get_cursor(&self, owner: &OwnerId) -> StoreResult<i64>;

    /// Advance the cursor; moving it backward is rejected
    async fn set_cursor(&self, owner: &OwnerId, timestamp: i64) -> StoreResult<()>;

    /// Remove a tombstoned record. Live records are never removed.
    async fn purge(&self, id: &NoteId) -> StoreResult<bool>;

    /// Mark a pushed version synced, unless it was edited again meanwhile
    async fn mark_synced(&self, id: &NoteId, updated_at: i64) -> StoreResult<bool>;

    /// Count a remote rejection and return the new total
    async fn record_rejection(&self, id: &NoteId, message: &str) -> StoreResult<u32>;

    /// Reset rejection counts so parked records are retried
    async fn clear_rejections(&self, owner: &OwnerId) -> StoreResult<usize>;

    /// Owners with notes or a cursor in this store
    async fn list_owners(&self) -> StoreResult<Vec<OwnerId>>;
}

/// `SQLite` implementation of `LocalStore`
#[derive(Clone)]
pub struct SqliteLocalStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteLocalStore {
    /// Open (and migrate) the store at the given filesystem path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::from_database(Database::open(path)?))
    }

    /// Open an in-memory store (primarily for tests)
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    fn upsert(conn: &Connection, record: &NoteRecord) -> StoreResult<()> {
        let tags = serde_json::to_string(&record.tags)?;
        conn.execute(
            "INSERT INTO notes (id, owner_id, title, body, tags, created_at, updated_at,
                                tombstone, sync_state, rejections, last_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                title = excluded.title,
                body = excluded.body,
                tags = excluded.tags,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                tombstone = excluded.tombstone,
                sync_state = excluded.sync_state,
                rejections = excluded.rejections,
                last_error = excluded.last_error",
            params![
                record.id.as_str(),
                record.owner_id.as_str(),
                record.title,
                record.body,
                tags,
                record.created_at,
                record.updated_at,
                record.tombstone,
                record.sync_state.as_str(),
                record.rejections,
                record.last_error,
            ],
        )?;
        Ok(())
    }

    fn query_notes(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StoreResult<Vec<NoteRecord>> {
        let mut stmt = conn.prepare(sql)?;
        let notes = stmt
            .query_map(params, Self::parse_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    /// Parse a note from a database row selected with `NOTE_COLUMNS`
    fn parse_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<NoteRecord> {
        let id: String = row.get(0)?;
        let tags: String = row.get(4)?;
        let sync_state: String = row.get(8)?;

        Ok(NoteRecord {
            id: id
                .parse()
                .map_err(|error| conversion_error(0, Type::Text, error))?,
            owner_id: OwnerId::new(row.get::<_, String>(1)?),
            title: row.get(2)?,
            body: row.get(3)?,
            tags: serde_json::from_str(&tags)
                .map_err(|error| conversion_error(4, Type::Text, error))?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            tombstone: row.get(7)?,
            sync_state: sync_state
                .parse::<SyncState>()
                .map_err(|error| conversion_error(8, Type::Text, error))?,
            rejections: row.get(9)?,
            last_error: row.get(10)?,
        })
    }
}

fn conversion_error(
    column: usize,
    kind: Type,
    error: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, kind, error.into())
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn put(&self, record: &NoteRecord) -> StoreResult<()> {
        let db = self.db.lock().await;
        Self::upsert(db.connection(), record)
    }

    async fn put_if_unchanged(
        &self,
        record: &NoteRecord,
        expected: Option<i64>,
    ) -> StoreResult<bool> {
        let mut db = self.db.lock().await;
        let tx = db.connection_mut().transaction()?;

        let current: Option<i64> = tx
            .query_row(
                "SELECT updated_at FROM notes WHERE id = ?",
                params![record.id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        if current != expected {
            return Ok(false);
        }

        Self::upsert(&tx, record)?;
        tx.commit()?;
        Ok(true)
    }

    async fn get(&self, id: &NoteId) -> StoreResult<Option<NoteRecord>> {
        let db = self.db.lock().await;
        let note = db
            .connection()
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?"),
                params![id.as_str()],
                Self::parse_note,
            )
            .optional()?;
        Ok(note)
    }

    async fn list_active(&self, owner: &OwnerId) -> StoreResult<Vec<NoteRecord>> {
        let db = self.db.lock().await;
        Self::query_notes(
            db.connection(),
            &format!(
                "SELECT {NOTE_COLUMNS} FROM notes
                 WHERE owner_id = ? AND tombstone = 0
                 ORDER BY updated_at DESC, id DESC"
            ),
            params![owner.as_str()],
        )
    }

    async fn list_dirty(&self, owner: &OwnerId) -> StoreResult<Vec<NoteRecord>> {
        let db = self.db.lock().await;
        Self::query_notes(
            db.connection(),
            &format!(
                "SELECT {NOTE_COLUMNS} FROM notes
                 WHERE owner_id = ? AND sync_state = ?
                 ORDER BY updated_at ASC, id ASC"
            ),
            params![owner.as_str(), SyncState::Dirty.as_str()],
        )
    }

    #[allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT
    async fn search(
        &self,
        owner: &OwnerId,
        query: &str,
        limit: usize,
    ) -> StoreResult<Vec<NoteRecord>> {
        let pattern = like_pattern(&query.trim().to_lowercase());
        let db = self.db.lock().await;
        Self::query_notes(
            db.connection(),
            &format!(
                "SELECT {NOTE_COLUMNS} FROM notes
                 WHERE owner_id = ?1 AND tombstone = 0
                   AND (title LIKE ?2 ESCAPE '\\'
                        OR body LIKE ?2 ESCAPE '\\'
                        OR tags LIKE ?2 ESCAPE '\\')
                 ORDER BY updated_at DESC, id DESC
                 LIMIT ?3"
            ),
            params![owner.as_str(), pattern, limit as i64],
        )
    }

    async fn get_cursor(&self, owner: &OwnerId) -> StoreResult<i64> {
        let db = self.db.lock().await;
        let cursor = db
            .connection()
            .query_row(
                "SELECT cursor FROM sync_cursors WHERE owner_id = ?",
                params![owner.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(cursor.unwrap_or(0))
    }

    async fn set_cursor(&self, owner: &OwnerId, timestamp: i64) -> StoreResult<()> {
        let mut db = self.db.lock().await;
        let tx = db.connection_mut().transaction()?;

        let current: i64 = tx
            .query_row(
                "SELECT cursor FROM sync_cursors WHERE owner_id = ?",
                params![owner.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        if timestamp < current {
            return Err(LocalStoreError::CursorRegression {
                owner: owner.to_string(),
                current,
                requested: timestamp,
            });
        }
        if timestamp == current {
            return Ok(());
        }

        tx.execute(
            "INSERT INTO sync_cursors (owner_id, cursor) VALUES (?1, ?2)
             ON CONFLICT(owner_id) DO UPDATE SET cursor = excluded.cursor",
            params![owner.as_str(), timestamp],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn purge(&self, id: &NoteId) -> StoreResult<bool> {
        let db = self.db.lock().await;
        let rows = db.connection().execute(
            "DELETE FROM notes WHERE id = ? AND tombstone = 1",
            params![id.as_str()],
        )?;
        Ok(rows > 0)
    }

    async fn mark_synced(&self, id: &NoteId, updated_at: i64) -> StoreResult<bool> {
        let db = self.db.lock().await;
        let rows = db.connection().execute(
            "UPDATE notes SET sync_state = ?1, rejections = 0, last_error = NULL
             WHERE id = ?2 AND updated_at = ?3 AND sync_state = ?4",
            params![
                SyncState::Synced.as_str(),
                id.as_str(),
                updated_at,
                SyncState::Dirty.as_str()
            ],
        )?;
        Ok(rows > 0)
    }

    async fn record_rejection(&self, id: &NoteId, message: &str) -> StoreResult<u32> {
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute(
            "UPDATE notes SET rejections = rejections + 1, last_error = ?1 WHERE id = ?2",
            params![message, id.as_str()],
        )?;
        let count = conn
            .query_row(
                "SELECT rejections FROM notes WHERE id = ?",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    async fn clear_rejections(&self, owner: &OwnerId) -> StoreResult<usize> {
        let db = self.db.lock().await;
        let rows = db.connection().execute(
            "UPDATE notes SET rejections = 0, last_error = NULL
             WHERE owner_id = ? AND rejections > 0",
            params![owner.as_str()],
        )?;
        Ok(rows)
    }

    async fn list_owners(&self) -> StoreResult<Vec<OwnerId>> {
        let db = self.db.lock().await;
        let mut stmt = db.connection().prepare(
            "SELECT owner_id FROM notes
             UNION
             SELECT owner_id FROM sync_cursors
             ORDER BY 1",
        )?;
        let owners = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|owner| owner.map(OwnerId::new))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(owners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn setup() -> SqliteLocalStore {
        SqliteLocalStore::open_in_memory().unwrap()
    }

    fn owner() -> OwnerId {
        OwnerId::new("alice")
    }

    fn note(title: &str, updated_at: i64) -> NoteRecord {
        let mut note = NoteRecord::new(owner(), title, "body", vec!["Work".to_string()]);
        note.updated_at = updated_at;
        note
    }

    #[tokio::test]
    async fn test_put_and_get_roundtrip() {
        let store = setup();
        let mut record = note("Hello", 10);
        record.last_error = Some("title too long".to_string());
        record.rejections = 2;

        store.put(&record).await.unwrap();

        let fetched = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn test_put_overwrites_by_id() {
        let store = setup();
        let mut record = note("First", 10);
        store.put(&record).await.unwrap();

        record.title = "Second".to_string();
        record.updated_at = 11;
        store.put(&record).await.unwrap();

        let active = store.list_active(&owner()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "Second");
    }

    #[tokio::test]
    async fn test_list_active_excludes_tombstones_and_orders_by_recency() {
        let store = setup();
        let older = note("Older", 10);
        let newer = note("Newer", 20);
        let mut deleted = note("Deleted", 30);
        deleted.tombstone = true;

        store.put(&older).await.unwrap();
        store.put(&newer).await.unwrap();
        store.put(&deleted).await.unwrap();

        let titles = store
            .list_active(&owner())
            .await
            .unwrap()
            .into_iter()
            .map(|note| note.title)
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["Newer".to_string(), "Older".to_string()]);
    }

    #[tokio::test]
    async fn test_queries_are_partitioned_by_owner() {
        let store = setup();
        store.put(&note("Mine", 10)).await.unwrap();
        let mut other = note("Theirs", 10);
        other.owner_id = OwnerId::new("bob");
        store.put(&other).await.unwrap();

        assert_eq!(store.list_active(&owner()).await.unwrap().len(), 1);
        assert_eq!(store.list_dirty(&owner()).await.unwrap().len(), 1);
        assert_eq!(
            store.list_owners().await.unwrap(),
            vec![OwnerId::new("alice"), OwnerId::new("bob")]
        );
    }

    #[tokio::test]
    async fn test_list_dirty_includes_tombstones_only_when_dirty() {
        let store = setup();
        let mut synced = note("Synced", 10);
        synced.sync_state = SyncState::Synced;
        let mut tombstone = note("Deleted", 20);
        tombstone.tombstone = true;

        store.put(&synced).await.unwrap();
        store.put(&tombstone).await.unwrap();

        let dirty = store.list_dirty(&owner()).await.unwrap();
        assert_eq!(dirty.len(), 1);
        assert!(dirty[0].tombstone);
    }

    #[tokio::test]
    async fn test_cursor_is_monotonic() {
        let store = setup();
        assert_eq!(store.get_cursor(&owner()).await.unwrap(), 0);

        store.set_cursor(&owner(), 100).await.unwrap();
        store.set_cursor(&owner(), 100).await.unwrap();
        let error = store.set_cursor(&owner(), 50).await.unwrap_err();

        assert!(matches!(
            error,
            LocalStoreError::CursorRegression {
                current: 100,
                requested: 50,
                ..
            }
        ));
        assert_eq!(store.get_cursor(&owner()).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_purge_only_removes_tombstones() {
        let store = setup();
        let live = note("Live", 10);
        let mut deleted = note("Deleted", 10);
        deleted.tombstone = true;
        store.put(&live).await.unwrap();
        store.put(&deleted).await.unwrap();

        assert!(!store.purge(&live.id).await.unwrap());
        assert!(store.purge(&deleted.id).await.unwrap());
        assert!(store.get(&live.id).await.unwrap().is_some());
        assert!(store.get(&deleted.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_synced_requires_matching_version() {
        let store = setup();
        let record = note("Draft", 10);
        store.put(&record).await.unwrap();

        assert!(!store.mark_synced(&record.id, 9).await.unwrap());
        assert!(store.mark_synced(&record.id, 10).await.unwrap());

        let fetched = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.sync_state, SyncState::Synced);
    }

    #[tokio::test]
    async fn test_put_if_unchanged_detects_concurrent_write() {
        let store = setup();
        let record = note("Local", 10);
        store.put(&record).await.unwrap();

        let mut remote = record.clone();
        remote.title = "Remote".to_string();
        remote.updated_at = 20;

        assert!(!store.put_if_unchanged(&remote, Some(9)).await.unwrap());
        assert!(!store.put_if_unchanged(&remote, None).await.unwrap());
        assert!(store.put_if_unchanged(&remote, Some(10)).await.unwrap());

        let fresh = note("Fresh", 5);
        assert!(store.put_if_unchanged(&fresh, None).await.unwrap());
        assert_eq!(store.get(&record.id).await.unwrap().unwrap().title, "Remote");
    }

    #[tokio::test]
    async fn test_rejection_bookkeeping() {
        let store = setup();
        let record = note("Invalid", 10);
        store.put(&record).await.unwrap();

        assert_eq!(store.record_rejection(&record.id, "bad").await.unwrap(), 1);
        assert_eq!(store.record_rejection(&record.id, "worse").await.unwrap(), 2);

        let fetched = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.last_error.as_deref(), Some("worse"));

        assert_eq!(store.clear_rejections(&owner()).await.unwrap(), 1);
        let fetched = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.rejections, 0);
        assert_eq!(fetched.last_error, None);
    }

    #[tokio::test]
    async fn test_search_matches_title_body_and_tags() {
        let store = setup();
        let mut groceries = note("Groceries", 10);
        groceries.body = "Milk and eggs".to_string();
        let mut recipe = note("Recipe", 20);
        recipe.body = "Milkshake 100% fun".to_string();
        recipe.tags = ["dessert".to_string()].into_iter().collect();
        let mut deleted = note("Milk run", 30);
        deleted.tombstone = true;

        store.put(&groceries).await.unwrap();
        store.put(&recipe).await.unwrap();
        store.put(&deleted).await.unwrap();

        assert_eq!(store.search(&owner(), "MILK", 10).await.unwrap().len(), 2);
        assert_eq!(store.search(&owner(), "milk", 1).await.unwrap().len(), 1);
        assert_eq!(store.search(&owner(), "dessert", 10).await.unwrap().len(), 1);
        assert_eq!(store.search(&owner(), "100%", 10).await.unwrap().len(), 1);
        assert!(store.search(&owner(), "_", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tidemark.db");
        let record = note("Offline thought", 10);

        {
            let store = SqliteLocalStore::open(&path).unwrap();
            store.put(&record).await.unwrap();
            store.set_cursor(&owner(), 42).await.unwrap();
        }

        let reopened = SqliteLocalStore::open(&path).unwrap();
        assert_eq!(reopened.get(&record.id).await.unwrap(), Some(record));
        assert_eq!(reopened.get_cursor(&owner()).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_undecodable_row_is_reported_as_decode_error() {
        let store = setup();
        let record = note("Broken", 10);
        store.put(&record).await.unwrap();
        store
            .db
            .lock()
            .await
            .connection()
            .execute("UPDATE notes SET sync_state = 'bogus'", [])
            .unwrap();

        let error = store.get(&record.id).await.unwrap_err();
        assert!(matches!(error, LocalStoreError::Decode(_)));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("a%b_c\\"), "%a\\%b\\_c\\\\%");
    }
}
