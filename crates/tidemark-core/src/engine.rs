//! Composition root wiring the store, remote, monitor and orchestrator.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::db::LocalStore;
use crate::models::OwnerId;
use crate::services::NoteService;
use crate::sync::{NetworkMonitor, PassOutcome, RemoteStore, SyncOrchestrator, SyncTrigger};
use crate::Result;

/// Owns one sync setup and the background tasks that drive it.
///
/// Nothing runs until `start`; `shutdown` (or dropping the engine) stops the
/// monitor and timer tasks. Notes can be edited through `notes()` whether or
/// not the engine is running.
pub struct SyncEngine {
    monitor: NetworkMonitor,
    orchestrator: SyncOrchestrator,
    notes: NoteService,
    config: SyncConfig,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        monitor: NetworkMonitor,
        config: SyncConfig,
    ) -> Self {
        let orchestrator =
            SyncOrchestrator::new(Arc::clone(&store), remote, monitor.clone(), config.clone());
        let trigger: Arc<dyn SyncTrigger> = Arc::new(orchestrator.clone());
        let notes = NoteService::new(store).with_trigger(trigger);

        Self {
            monitor,
            orchestrator,
            notes,
            config,
            tasks: Vec::new(),
        }
    }

    pub const fn notes(&self) -> &NoteService {
        &self.notes
    }

    pub const fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    pub const fn monitor(&self) -> &NetworkMonitor {
        &self.monitor
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Start the connectivity listener (which fires the startup pass) and
    /// the periodic timer when one is configured. Calling it twice is a no-op.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let trigger: Arc<dyn SyncTrigger> = Arc::new(self.orchestrator.clone());
        self.tasks.push(self.monitor.spawn(trigger));

        if let Some(interval) = self.config.sync_interval {
            self.tasks.push(self.orchestrator.spawn_periodic(interval));
        }

        tracing::info!(
            interval_secs = self.config.sync_interval.map(|interval| interval.as_secs()),
            "Sync engine started"
        );
    }

    /// Run a pass for `owner` now and wait for the result
    pub async fn sync_now(&self, owner: &OwnerId) -> Result<PassOutcome> {
        self.orchestrator.run_pass(owner).await
    }

    /// Stop background tasks. A pass already running finishes on its own.
    pub async fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
        tracing::info!("Sync engine stopped");
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::SqliteLocalStore;
    use crate::services::{NewNote, NoteChanges};
    use crate::sync::{MemoryRemoteStore, SkipReason};

    fn owner() -> OwnerId {
        OwnerId::new("alice")
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if condition() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    fn engine(
        store: Arc<SqliteLocalStore>,
        remote: Arc<MemoryRemoteStore>,
        monitor: NetworkMonitor,
    ) -> SyncEngine {
        SyncEngine::new(store, remote, monitor, SyncConfig::default().without_auto_sync())
    }

    #[tokio::test]
    async fn offline_note_survives_restart_and_syncs_after_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.db");
        let remote = Arc::new(MemoryRemoteStore::new());

        let created = {
            let store = Arc::new(SqliteLocalStore::open(&path).unwrap());
            let engine = engine(store, remote.clone(), NetworkMonitor::offline());

            let note = engine
                .notes()
                .create(&owner(), NewNote::new("offline", "written on a plane"))
                .await
                .unwrap();
            assert_eq!(engine.notes().list_active(&owner()).await.unwrap(), vec![note.clone()]);
            assert_eq!(
                engine.sync_now(&owner()).await.unwrap(),
                PassOutcome::Skipped(SkipReason::Offline)
            );
            note
        };

        let store = Arc::new(SqliteLocalStore::open(&path).unwrap());
        let monitor = NetworkMonitor::offline();
        let mut engine = engine(store.clone(), remote.clone(), monitor.clone());

        let reopened = engine.notes().list_active(&owner()).await.unwrap();
        assert_eq!(reopened, vec![created.clone()]);
        assert!(reopened[0].is_dirty());
        assert_eq!(remote.push_calls(), 0);

        engine.start();
        monitor.set_online();
        wait_until(|| remote.get(&owner(), &created.id).is_some()).await;
        wait_until(|| !engine.orchestrator().is_syncing(&owner())).await;

        assert!(!store.get(&created.id).await.unwrap().unwrap().is_dirty());
        engine.shutdown().await;
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn offline_edits_collapse_into_one_upsert_with_latest_content() {
        let store = Arc::new(SqliteLocalStore::open_in_memory().unwrap());
        let remote = Arc::new(MemoryRemoteStore::new());
        let monitor = NetworkMonitor::offline();
        let engine = engine(store, remote.clone(), monitor.clone());

        let note = engine
            .notes()
            .create(&owner(), NewNote::new("N1", "X"))
            .await
            .unwrap();
        let edited = engine
            .notes()
            .update(
                &note.id,
                NoteChanges {
                    body: Some("Y".to_string()),
                    ..NoteChanges::default()
                },
            )
            .await
            .unwrap();
        assert!(edited.updated_at > note.updated_at);
        assert!(edited.is_dirty());

        // Let the mutation triggers run into the offline gate.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        monitor.set_online();
        let outcome = engine.sync_now(&owner()).await.unwrap();

        assert!(matches!(outcome, PassOutcome::Completed(_)));
        let upserted = remote.upserted();
        assert_eq!(upserted.len(), 1);
        assert_eq!(upserted[0].body, "Y");
        assert_eq!(remote.upsert_calls(), 1);
    }

    #[tokio::test]
    async fn start_runs_startup_pass_and_is_idempotent() {
        let store = Arc::new(SqliteLocalStore::open_in_memory().unwrap());
        let remote = Arc::new(MemoryRemoteStore::new());
        let mut note = crate::models::NoteRecord::new(owner(), "from server", "", vec![]);
        note.updated_at = 100;
        remote.insert(note.clone());

        let mut engine = engine(store.clone(), remote, NetworkMonitor::online());
        engine.orchestrator().register_owner(&owner());
        engine.start();
        engine.start();

        wait_until(|| engine.orchestrator().status() == crate::SyncStatus::Synced).await;
        assert_eq!(store.get_cursor(&owner()).await.unwrap(), 100);
        assert_eq!(engine.notes().get(&note.id).await.unwrap().unwrap().title, "from server");
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn timer_stops_after_shutdown() {
        let store = Arc::new(SqliteLocalStore::open_in_memory().unwrap());
        let remote = Arc::new(MemoryRemoteStore::new());
        let mut engine = SyncEngine::new(
            store,
            remote.clone(),
            NetworkMonitor::offline(),
            SyncConfig::default().with_sync_interval(Duration::from_secs(5)),
        );
        engine.orchestrator().register_owner(&owner());
        engine.start();
        engine.monitor().set_online();

        tokio::time::sleep(Duration::from_secs(6)).await;
        wait_until(|| remote.list_calls() >= 1).await;
        engine.shutdown().await;

        let calls = remote.list_calls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(remote.list_calls() <= calls + 1);
    }
}
