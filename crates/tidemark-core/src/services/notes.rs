//! Note mutations and queries.
//!
//! Every mutation goes through `NoteService::commit`: write to the local
//! store, then ask for a sync. The write is the only thing a caller waits on.

use std::sync::Arc;

use crate::db::LocalStore;
use crate::models::{normalize_tags, NoteId, NoteRecord, OwnerId};
use crate::sync::{SyncTrigger, TriggerReason};
use crate::{Error, Result};

/// Content of a note to create
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewNote {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
}

impl NewNote {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Fields to change on an existing note; `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub body: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl NoteChanges {
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none() && self.tags.is_none()
    }
}

/// Entry point for creating, editing and deleting notes
#[derive(Clone)]
pub struct NoteService {
    store: Arc<dyn LocalStore>,
    trigger: Option<Arc<dyn SyncTrigger>>,
}

impl NoteService {
    /// Local-only service; mutations never schedule a sync
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            trigger: None,
        }
    }

    /// Schedule a sync through `trigger` after every mutation
    #[must_use]
    pub fn with_trigger(mut self, trigger: Arc<dyn SyncTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    pub async fn create(&self, owner: &OwnerId, note: NewNote) -> Result<NoteRecord> {
        if owner.as_str().is_empty() {
            return Err(Error::InvalidInput("owner must not be empty".to_string()));
        }

        let record = NoteRecord::new(owner.clone(), note.title.trim(), note.body, note.tags);
        if record.is_empty() {
            return Err(Error::InvalidInput(
                "note needs a title or a body".to_string(),
            ));
        }

        self.commit(&record).await?;
        tracing::debug!(id = %record.id, owner = %owner, "Created note");
        Ok(record)
    }

    pub async fn update(&self, id: &NoteId, changes: NoteChanges) -> Result<NoteRecord> {
        let record = self.active(id).await?;
        if changes.is_empty() {
            return Ok(record);
        }

        let mut next = record.clone();
        if let Some(title) = changes.title {
            next.title = title.trim().to_string();
        }
        if let Some(body) = changes.body {
            next.body = body;
        }
        if let Some(tags) = changes.tags {
            next.tags = normalize_tags(tags);
        }

        if next.is_empty() {
            return Err(Error::InvalidInput(
                "note needs a title or a body".to_string(),
            ));
        }
        if next.title == record.title && next.body == record.body && next.tags == record.tags {
            return Ok(record);
        }

        next.touch();
        self.commit(&next).await?;
        tracing::debug!(id = %id, "Updated note");
        Ok(next)
    }

    /// Tombstone a note. It disappears from queries at once and is purged
    /// after the remote acknowledges the delete.
    pub async fn delete(&self, id: &NoteId) -> Result<NoteRecord> {
        let mut record = self.active(id).await?;
        record.tombstone = true;
        record.touch();
        self.commit(&record).await?;
        tracing::debug!(id = %id, "Deleted note");
        Ok(record)
    }

    /// Fetch a live note; tombstones read as absent
    pub async fn get(&self, id: &NoteId) -> Result<Option<NoteRecord>> {
        Ok(self
            .store
            .get(id)
            .await?
            .filter(|record| !record.tombstone))
    }

    pub async fn list_active(&self, owner: &OwnerId) -> Result<Vec<NoteRecord>> {
        Ok(self.store.list_active(owner).await?)
    }

    pub async fn search(
        &self,
        owner: &OwnerId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<NoteRecord>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("search query must not be empty".to_string()));
        }
        Ok(self.store.search(owner, query, limit).await?)
    }

    async fn active(&self, id: &NoteId) -> Result<NoteRecord> {
        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn commit(&self, record: &NoteRecord) -> Result<()> {
        self.store.put(record).await?;
        if let Some(trigger) = &self.trigger {
            trigger.trigger_owner(&record.owner_id, TriggerReason::Mutation);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::SqliteLocalStore;
    use crate::models::SyncState;

    #[derive(Default)]
    struct RecordingTrigger {
        owners: Mutex<Vec<(OwnerId, TriggerReason)>>,
    }

    impl SyncTrigger for RecordingTrigger {
        fn trigger(&self, _reason: TriggerReason) {}

        fn trigger_owner(&self, owner: &OwnerId, reason: TriggerReason) {
            self.owners.lock().unwrap().push((owner.clone(), reason));
        }
    }

    fn owner() -> OwnerId {
        OwnerId::new("alice")
    }

    fn service() -> (NoteService, Arc<RecordingTrigger>) {
        let store = Arc::new(SqliteLocalStore::open_in_memory().unwrap());
        let trigger = Arc::new(RecordingTrigger::default());
        let service = NoteService::new(store).with_trigger(trigger.clone());
        (service, trigger)
    }

    #[tokio::test]
    async fn create_writes_dirty_record_and_schedules_sync() {
        let (service, trigger) = service();

        let note = service
            .create(
                &owner(),
                NewNote::new("  Groceries ", "milk").with_tags(["Home", "#errands"]),
            )
            .await
            .unwrap();

        assert_eq!(note.title, "Groceries");
        assert_eq!(note.sync_state, SyncState::Dirty);
        assert!(note.tags.contains("home"));
        assert!(note.tags.contains("errands"));
        assert_eq!(service.list_active(&owner()).await.unwrap(), vec![note]);
        assert_eq!(
            *trigger.owners.lock().unwrap(),
            vec![(owner(), TriggerReason::Mutation)]
        );
    }

    #[tokio::test]
    async fn create_rejects_blank_notes() {
        let (service, trigger) = service();

        let result = service.create(&owner(), NewNote::new(" ", "\n")).await;

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(trigger.owners.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_bumps_timestamp_and_keeps_id() {
        let (service, _) = service();
        let note = service
            .create(&owner(), NewNote::new("draft", "x"))
            .await
            .unwrap();

        let updated = service
            .update(
                &note.id,
                NoteChanges {
                    body: Some("y".to_string()),
                    ..NoteChanges::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.id, note.id);
        assert_eq!(updated.body, "y");
        assert!(updated.updated_at > note.updated_at);
        assert!(updated.is_dirty());
    }

    #[tokio::test]
    async fn update_without_changes_is_a_no_op() {
        let (service, trigger) = service();
        let note = service
            .create(&owner(), NewNote::new("same", "x"))
            .await
            .unwrap();

        let unchanged = service
            .update(
                &note.id,
                NoteChanges {
                    title: Some("same".to_string()),
                    ..NoteChanges::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(unchanged.updated_at, note.updated_at);
        assert_eq!(trigger.owners.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_tombstones_and_hides_note() {
        let (service, trigger) = service();
        let note = service
            .create(&owner(), NewNote::new("doomed", ""))
            .await
            .unwrap();

        let deleted = service.delete(&note.id).await.unwrap();

        assert!(deleted.tombstone);
        assert!(deleted.is_dirty());
        assert!(service.list_active(&owner()).await.unwrap().is_empty());
        assert_eq!(service.get(&note.id).await.unwrap(), None);
        assert!(service.store().get(&note.id).await.unwrap().is_some());
        assert_eq!(trigger.owners.lock().unwrap().len(), 2);

        assert!(matches!(
            service.delete(&note.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn mutations_without_trigger_stay_local() {
        let store = Arc::new(SqliteLocalStore::open_in_memory().unwrap());
        let service = NoteService::new(store);

        let note = service
            .create(&owner(), NewNote::new("offline", ""))
            .await
            .unwrap();

        assert_eq!(service.get(&note.id).await.unwrap(), Some(note));
    }

    #[tokio::test]
    async fn search_requires_query() {
        let (service, _) = service();
        service
            .create(&owner(), NewNote::new("Rust notes", "ownership"))
            .await
            .unwrap();

        assert_eq!(service.search(&owner(), "OWNER", 10).await.unwrap().len(), 1);
        assert!(matches!(
            service.search(&owner(), "  ", 10).await,
            Err(Error::InvalidInput(_))
        ));
    }
}
