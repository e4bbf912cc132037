//! Reconciliation passes between the local store and the remote store.
//!
//! A pass pushes dirty local records first, then pulls remote changes since
//! the owner's cursor. At most one pass runs per owner; triggers that arrive
//! while a pass is in flight are coalesced, since the running or the next
//! pass picks up whatever they would have pushed.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::network::{NetworkMonitor, SyncTrigger, TriggerReason};
use super::remote::{RemoteResult, RemoteStore};
use super::resolver::{resolve, Resolution};
use crate::config::SyncConfig;
use crate::db::{LocalStore, StoreResult};
use crate::error::{Error, RemoteError};
use crate::models::{NoteId, NoteRecord, OwnerId, SyncState};
use crate::state::SyncStatus;
use crate::Result;

/// Counters describing one completed pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Live records upserted and marked synced
    pub pushed: usize,
    /// Tombstones deleted remotely and purged locally
    pub deleted: usize,
    /// Dirty records not pushed because a newer remote version exists
    pub superseded: usize,
    /// Records rejected by the remote during this pass
    pub rejected: usize,
    /// Dirty records skipped because they reached the rejection limit
    pub parked: usize,
    /// Pushes that timed out
    pub failed: usize,
    /// Remote rows written to (or purged from) the local store
    pub pulled: usize,
    /// Remote rows skipped because a local edit landed while applying them
    pub stale: usize,
    /// Records still dirty when the pass finished
    pub pending: usize,
    pub cursor_before: i64,
    pub cursor_after: i64,
}

impl SyncReport {
    const fn new(cursor: i64) -> Self {
        Self {
            pushed: 0,
            deleted: 0,
            superseded: 0,
            rejected: 0,
            parked: 0,
            failed: 0,
            pulled: 0,
            stale: 0,
            pending: 0,
            cursor_before: cursor,
            cursor_after: cursor,
        }
    }

    /// Push calls that reached the remote store
    pub const fn push_attempts(&self) -> usize {
        self.pushed + self.deleted + self.rejected + self.failed
    }
}

/// Why a pass did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another pass for the same owner is running
    InFlight,
    /// The network monitor reports no connectivity
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(SyncReport),
    Skipped(SkipReason),
}

/// Result of applying one pulled row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Written,
    Purged,
    Unchanged,
    KeptLocal,
    Stale,
}

/// Coordinates sync passes for every owner of a local store.
///
/// Cloning is cheap and shares all state, including the in-flight set.
#[derive(Clone)]
pub struct SyncOrchestrator {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    monitor: NetworkMonitor,
    config: SyncConfig,
    in_flight: Arc<Mutex<HashSet<OwnerId>>>,
    owners: Arc<Mutex<BTreeSet<OwnerId>>>,
    status: Arc<watch::Sender<SyncStatus>>,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        monitor: NetworkMonitor,
        config: SyncConfig,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        Self {
            store,
            remote,
            monitor,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            owners: Arc::new(Mutex::new(BTreeSet::new())),
            status: Arc::new(status),
        }
    }

    /// Include `owner` in triggers that target every owner
    pub fn register_owner(&self, owner: &OwnerId) {
        lock(&self.owners).insert(owner.clone());
    }

    /// Outcome of the most recent pass, whichever owner it ran for
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Watch the process-wide status signal.
    ///
    /// There is one signal per orchestrator, not per owner: every pass
    /// publishes to it, so with several registered owners a receiver sees
    /// the last pass to report, which may belong to any of them. Use the
    /// `PassOutcome` returned by [`SyncOrchestrator::run_pass`] for a
    /// per-owner result.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Whether a pass for `owner` is currently running
    pub fn is_syncing(&self, owner: &OwnerId) -> bool {
        lock(&self.in_flight).contains(owner)
    }

    /// Run one pass for `owner` and wait for it to finish.
    ///
    /// Returns `Skipped` without touching the network when a pass is already
    /// running for the owner or the monitor reports offline. Pass-level
    /// failures (unreachable remote, invalid session, local store errors)
    /// are returned after the status signal has been updated.
    pub async fn run_pass(&self, owner: &OwnerId) -> Result<PassOutcome> {
        self.register_owner(owner);
        let Some(_guard) = InFlightGuard::claim(&self.in_flight, owner) else {
            tracing::debug!(owner = %owner, "Sync already in flight, skipping");
            return Ok(PassOutcome::Skipped(SkipReason::InFlight));
        };

        if !self.monitor.is_online() {
            tracing::debug!(owner = %owner, "Offline, skipping sync");
            self.publish(SyncStatus::Offline);
            return Ok(PassOutcome::Skipped(SkipReason::Offline));
        }

        self.publish(SyncStatus::Syncing);
        tracing::debug!(owner = %owner, "Sync pass started");

        match self.reconcile(owner).await {
            Ok(report) => {
                tracing::info!(
                    owner = %owner,
                    pushed = report.pushed,
                    deleted = report.deleted,
                    pulled = report.pulled,
                    rejected = report.rejected,
                    parked = report.parked,
                    failed = report.failed,
                    cursor = report.cursor_after,
                    "Sync pass completed"
                );
                self.publish(if report.pending == 0 {
                    SyncStatus::Synced
                } else {
                    SyncStatus::Pending
                });
                Ok(PassOutcome::Completed(report))
            }
            Err(error) => {
                tracing::warn!(owner = %owner, "Sync pass aborted: {error}");
                self.publish(status_for_error(&error));
                Err(error)
            }
        }
    }

    /// Fire a timer trigger for every owner on each interval tick.
    ///
    /// The first tick is one interval after the call.
    pub fn spawn_periodic(&self, interval: Duration) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                orchestrator.trigger(TriggerReason::Timer);
            }
        })
    }

    async fn reconcile(&self, owner: &OwnerId) -> Result<SyncReport> {
        let cursor = self.store.get_cursor(owner).await?;
        let mut report = SyncReport::new(cursor);

        self.push(owner, cursor, &mut report).await?;
        self.pull(owner, cursor, &mut report).await?;

        report.pending = self.store.list_dirty(owner).await?.len();
        Ok(report)
    }

    async fn push(&self, owner: &OwnerId, cursor: i64, report: &mut SyncReport) -> Result<()> {
        let max_rejections = self.config.max_rejections;
        let (parked, ready): (Vec<_>, Vec<_>) = self
            .store
            .list_dirty(owner)
            .await?
            .into_iter()
            .partition(|record| record.rejections >= max_rejections);
        report.parked = parked.len();

        if ready.is_empty() {
            return Ok(());
        }

        // Remote versions newer than the cursor. A dirty record that loses to
        // one of them is left for the pull phase instead of overwriting it.
        let newer: HashMap<NoteId, NoteRecord> = self
            .call(self.remote.list_since(owner, cursor))
            .await?
            .into_iter()
            .map(|record| (record.id, record))
            .collect();

        for record in ready {
            if resolve(Some(&record), newer.get(&record.id)) == Some(Resolution::TakeRemote) {
                tracing::debug!(id = %record.id, "Remote version is newer, not pushing");
                report.superseded += 1;
                continue;
            }

            let result = if record.tombstone {
                self.call(self.remote.delete(owner, &record.id)).await
            } else {
                self.call(self.remote.upsert(owner, &record))
                    .await
                    .map(|_| ())
            };

            match result {
                Ok(()) if record.tombstone => {
                    self.store.purge(&record.id).await?;
                    report.deleted += 1;
                }
                Ok(()) => {
                    if !self.store.mark_synced(&record.id, record.updated_at).await? {
                        tracing::debug!(id = %record.id, "Edited during push, stays dirty");
                    }
                    report.pushed += 1;
                }
                Err(RemoteError::Rejected(message)) => {
                    let count = self.store.record_rejection(&record.id, &message).await?;
                    report.rejected += 1;
                    if count >= max_rejections {
                        tracing::warn!(
                            id = %record.id,
                            rejections = count,
                            "Record parked after repeated rejections: {message}"
                        );
                    } else {
                        tracing::warn!(
                            id = %record.id,
                            rejections = count,
                            "Push rejected: {message}"
                        );
                    }
                }
                Err(RemoteError::Timeout(millis)) => {
                    tracing::warn!(id = %record.id, timeout_ms = millis, "Push timed out");
                    report.failed += 1;
                }
                Err(error) => return Err(error.into()),
            }
        }

        Ok(())
    }

    async fn pull(&self, owner: &OwnerId, cursor: i64, report: &mut SyncReport) -> Result<()> {
        let rows = self.call(self.remote.list_since(owner, cursor)).await?;

        let mut outcomes = Vec::with_capacity(rows.len());
        let mut failure = None;
        for row in rows.into_iter().filter(|row| row.updated_at > cursor) {
            let updated_at = row.updated_at;
            match self.apply_remote(row).await {
                Ok(applied) => {
                    match applied {
                        Applied::Written | Applied::Purged => report.pulled += 1,
                        Applied::Stale => report.stale += 1,
                        Applied::Unchanged | Applied::KeptLocal => {}
                    }
                    outcomes.push((updated_at, applied != Applied::Stale));
                }
                Err(error) => {
                    outcomes.push((updated_at, false));
                    failure = Some(error);
                    break;
                }
            }
        }

        let next = next_cursor(cursor, &outcomes);
        if next > cursor {
            self.store.set_cursor(owner, next).await?;
        }
        report.cursor_after = next;

        match failure {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    async fn apply_remote(&self, remote: NoteRecord) -> StoreResult<Applied> {
        let local = self.store.get(&remote.id).await?;
        if resolve(local.as_ref(), Some(&remote)) != Some(Resolution::TakeRemote) {
            return Ok(Applied::KeptLocal);
        }

        let expected = local.as_ref().map(|local| local.updated_at);
        let mut adopted = remote;
        adopted.sync_state = SyncState::Synced;
        adopted.rejections = 0;
        adopted.last_error = None;

        if adopted.tombstone {
            if local.is_none() {
                return Ok(Applied::Unchanged);
            }
            if !self.store.put_if_unchanged(&adopted, expected).await? {
                return Ok(Applied::Stale);
            }
            self.store.purge(&adopted.id).await?;
            return Ok(Applied::Purged);
        }

        if local.as_ref() == Some(&adopted) {
            return Ok(Applied::Unchanged);
        }
        if self.store.put_if_unchanged(&adopted, expected).await? {
            Ok(Applied::Written)
        } else {
            Ok(Applied::Stale)
        }
    }

    /// Bound a remote call by the configured timeout
    async fn call<T>(
        &self,
        future: impl Future<Output = RemoteResult<T>> + Send,
    ) -> RemoteResult<T> {
        let timeout = self.config.call_timeout;
        tokio::time::timeout(timeout, future)
            .await
            .map_err(|_elapsed| {
                RemoteError::Timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
            })?
    }

    fn publish(&self, status: SyncStatus) {
        self.status.send_replace(status);
    }

    async fn known_owners(&self) -> BTreeSet<OwnerId> {
        let mut owners = lock(&self.owners).clone();
        match self.store.list_owners().await {
            Ok(stored) => owners.extend(stored),
            Err(error) => tracing::warn!("Failed to list owners: {error}"),
        }
        owners
    }

    fn spawn_task<F>(future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(future);
            }
            Err(_) => tracing::warn!("No async runtime available, sync trigger dropped"),
        }
    }
}

impl SyncTrigger for SyncOrchestrator {
    fn trigger(&self, reason: TriggerReason) {
        let orchestrator = self.clone();
        Self::spawn_task(async move {
            for owner in orchestrator.known_owners().await {
                orchestrator.trigger_owner(&owner, reason);
            }
        });
    }

    fn trigger_owner(&self, owner: &OwnerId, reason: TriggerReason) {
        self.register_owner(owner);
        if self.is_syncing(owner) {
            tracing::debug!(owner = %owner, reason = reason.as_str(), "Sync trigger coalesced");
            return;
        }

        tracing::debug!(owner = %owner, reason = reason.as_str(), "Sync triggered");
        let orchestrator = self.clone();
        let owner = owner.clone();
        Self::spawn_task(async move {
            // Failures are already logged and published as status.
            let _ = orchestrator.run_pass(&owner).await;
        });
    }
}

/// Cursor after a pull: the newest timestamp of the applied prefix, kept
/// strictly below the first row that was not applied.
fn next_cursor(cursor: i64, outcomes: &[(i64, bool)]) -> i64 {
    let first_unapplied = outcomes
        .iter()
        .find(|(_, applied)| !applied)
        .map(|(updated_at, _)| *updated_at);

    let applied_max = outcomes
        .iter()
        .take_while(|(_, applied)| *applied)
        .map(|(updated_at, _)| *updated_at)
        .max()
        .unwrap_or(cursor);

    let bounded = match first_unapplied {
        Some(updated_at) => applied_max.min(updated_at.saturating_sub(1)),
        None => applied_max,
    };
    bounded.max(cursor)
}

fn status_for_error(error: &Error) -> SyncStatus {
    match error {
        Error::Remote(RemoteError::Network(_) | RemoteError::Timeout(_)) => SyncStatus::Offline,
        other => SyncStatus::Error(other.to_string()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks an owner as in flight until dropped
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<OwnerId>>>,
    owner: OwnerId,
}

impl InFlightGuard {
    fn claim(in_flight: &Arc<Mutex<HashSet<OwnerId>>>, owner: &OwnerId) -> Option<Self> {
        if !lock(in_flight).insert(owner.clone()) {
            return None;
        }
        Some(Self {
            in_flight: Arc::clone(in_flight),
            owner: owner.clone(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.owner);
    }
}
