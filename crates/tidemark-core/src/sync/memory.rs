//! In-process remote store.
//!
//! Behaves like the managed API (idempotent by id, tombstones kept for change
//! listing) and adds switches for exercising failure paths: going offline,
//! rejecting specific records, slowing down pushes and holding calls at a gate.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use super::remote::{RemoteResult, RemoteStore};
use crate::error::RemoteError;
use crate::models::{next_timestamp, NoteId, NoteRecord, OwnerId, SyncState};

#[derive(Default)]
struct State {
    notes: HashMap<OwnerId, BTreeMap<NoteId, NoteRecord>>,
    rejected: HashMap<NoteId, String>,
    upserted: Vec<NoteRecord>,
    offline: bool,
    unauthorized: bool,
    push_latency: Option<Duration>,
}

/// Remote store kept in memory. Cloning shares the same state.
#[derive(Clone)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<State>>,
    gate: Arc<watch::Sender<bool>>,
    upsert_calls: Arc<AtomicUsize>,
    delete_calls: Arc<AtomicUsize>,
    list_calls: Arc<AtomicUsize>,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Arc::new(Mutex::new(State::default())),
            gate: Arc::new(gate),
            upsert_calls: Arc::new(AtomicUsize::new(0)),
            delete_calls: Arc::new(AtomicUsize::new(0)),
            list_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Store a record as if another device had written it
    pub fn insert(&self, record: NoteRecord) {
        let mut record = record;
        record.sync_state = SyncState::Synced;
        record.rejections = 0;
        record.last_error = None;
        self.lock()
            .notes
            .entry(record.owner_id.clone())
            .or_default()
            .insert(record.id, record);
    }

    pub fn get(&self, owner: &OwnerId, id: &NoteId) -> Option<NoteRecord> {
        self.lock()
            .notes
            .get(owner)
            .and_then(|notes| notes.get(id).cloned())
    }

    /// All records for an owner, tombstones included
    pub fn records(&self, owner: &OwnerId) -> Vec<NoteRecord> {
        self.lock()
            .notes
            .get(owner)
            .map(|notes| notes.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every payload accepted by `upsert`, in call order
    pub fn upserted(&self) -> Vec<NoteRecord> {
        self.lock().upserted.clone()
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn set_unauthorized(&self, unauthorized: bool) {
        self.lock().unauthorized = unauthorized;
    }

    /// Delay every upsert and delete by `latency`
    pub fn set_push_latency(&self, latency: Option<Duration>) {
        self.lock().push_latency = latency;
    }

    /// Reject every write for `id` with the given message
    pub fn reject(&self, id: NoteId, message: impl Into<String>) {
        self.lock().rejected.insert(id, message.into());
    }

    pub fn accept(&self, id: &NoteId) {
        self.lock().rejected.remove(id);
    }

    /// Make calls wait until `release` is called
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Push calls (upserts and deletes) seen so far
    pub fn push_calls(&self) -> usize {
        self.upsert_calls() + self.delete_calls()
    }

    async fn enter(&self, id: Option<&NoteId>) -> RemoteResult<()> {
        let mut gate = self.gate.subscribe();
        // The sender lives as long as `self`, so this only fails on shutdown.
        let _ = gate.wait_for(|open| *open).await;

        let latency = self.lock().push_latency.filter(|_| id.is_some());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.lock();
        if state.offline {
            return Err(RemoteError::Network("remote unreachable".to_string()));
        }
        if state.unauthorized {
            return Err(RemoteError::Unauthorized("session expired".to_string()));
        }
        if let Some(message) = id.and_then(|id| state.rejected.get(id)) {
            return Err(RemoteError::Rejected(message.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn upsert(&self, owner: &OwnerId, record: &NoteRecord) -> RemoteResult<NoteRecord> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.enter(Some(&record.id)).await?;

        let mut stored = record.clone();
        stored.owner_id = owner.clone();
        stored.sync_state = SyncState::Synced;
        stored.rejections = 0;
        stored.last_error = None;

        let mut state = self.lock();
        state.upserted.push(stored.clone());
        state
            .notes
            .entry(owner.clone())
            .or_default()
            .insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, owner: &OwnerId, id: &NoteId) -> RemoteResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.enter(Some(id)).await?;

        let mut state = self.lock();
        if let Some(existing) = state.notes.get_mut(owner).and_then(|notes| notes.get_mut(id)) {
            if !existing.tombstone {
                existing.tombstone = true;
                existing.updated_at = next_timestamp(existing.updated_at);
            }
        }
        Ok(())
    }

    async fn list_since(&self, owner: &OwnerId, cursor: i64) -> RemoteResult<Vec<NoteRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.enter(None).await?;

        let mut rows = self
            .lock()
            .notes
            .get(owner)
            .map(|notes| {
                notes
                    .values()
                    .filter(|note| note.updated_at > cursor)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        rows.sort_by_key(|note| (note.updated_at, note.id));
        Ok(rows)
    }
}
