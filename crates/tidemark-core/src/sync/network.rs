//! Connectivity tracking and sync triggers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::OwnerId;

/// Why a sync pass was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    Startup,
    Reconnect,
    Mutation,
    Timer,
    Manual,
}

impl TriggerReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Reconnect => "reconnect",
            Self::Mutation => "mutation",
            Self::Timer => "timer",
            Self::Manual => "manual",
        }
    }
}

/// Receiver of sync requests. Calls return immediately; the pass runs later.
pub trait SyncTrigger: Send + Sync {
    /// Request a pass for every known owner
    fn trigger(&self, reason: TriggerReason);

    /// Request a pass for one owner
    fn trigger_owner(&self, owner: &OwnerId, reason: TriggerReason);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

/// Observes online/offline transitions.
///
/// Cloning shares the same underlying state.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    state: Arc<watch::Sender<Connectivity>>,
}

impl NetworkMonitor {
    pub fn new(initial: Connectivity) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            state: Arc::new(sender),
        }
    }

    pub fn online() -> Self {
        Self::new(Connectivity::Online)
    }

    pub fn offline() -> Self {
        Self::new(Connectivity::Offline)
    }

    pub fn connectivity(&self) -> Connectivity {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.connectivity() == Connectivity::Online
    }

    /// Record the current connectivity. Returns whether it changed.
    pub fn set(&self, connectivity: Connectivity) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == connectivity {
                false
            } else {
                *current = connectivity;
                true
            }
        });
        if changed {
            tracing::info!(?connectivity, "Connectivity changed");
        }
        changed
    }

    pub fn set_online(&self) -> bool {
        self.set(Connectivity::Online)
    }

    pub fn set_offline(&self) -> bool {
        self.set(Connectivity::Offline)
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }

    /// Fire a startup trigger, then a reconnect trigger on every
    /// offline to online transition. Runs until the task is aborted.
    pub fn spawn(&self, trigger: Arc<dyn SyncTrigger>) -> JoinHandle<()> {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            let mut previous = *receiver.borrow_and_update();
            trigger.trigger(TriggerReason::Startup);

            while receiver.changed().await.is_ok() {
                let current = *receiver.borrow_and_update();
                if previous == Connectivity::Offline && current == Connectivity::Online {
                    trigger.trigger(TriggerReason::Reconnect);
                }
                previous = current;
            }
        })
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::online()
    }
}

/// Poll a reachability check and feed the result into the monitor.
///
/// The first check runs immediately.
pub fn spawn_health_check<F, Fut>(
    monitor: NetworkMonitor,
    interval: Duration,
    check: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if check().await {
                monitor.set_online();
            } else {
                monitor.set_offline();
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingTrigger {
        reasons: Mutex<Vec<TriggerReason>>,
    }

    impl RecordingTrigger {
        fn reasons(&self) -> Vec<TriggerReason> {
            self.reasons.lock().unwrap().clone()
        }
    }

    impl SyncTrigger for RecordingTrigger {
        fn trigger(&self, reason: TriggerReason) {
            self.reasons.lock().unwrap().push(reason);
        }

        fn trigger_owner(&self, _owner: &OwnerId, reason: TriggerReason) {
            self.trigger(reason);
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn set_reports_only_real_transitions() {
        let monitor = NetworkMonitor::offline();
        assert!(!monitor.is_online());
        assert!(!monitor.set_offline());
        assert!(monitor.set_online());
        assert!(!monitor.set_online());
        assert!(monitor.is_online());
    }

    #[test]
    fn clones_share_state() {
        let monitor = NetworkMonitor::online();
        let other = monitor.clone();
        other.set_offline();
        assert_eq!(monitor.connectivity(), Connectivity::Offline);
    }

    #[tokio::test]
    async fn spawn_triggers_on_startup_and_reconnect_only() {
        let monitor = NetworkMonitor::offline();
        let trigger = Arc::new(RecordingTrigger::default());
        let handle = monitor.spawn(trigger.clone());

        settle().await;
        assert_eq!(trigger.reasons(), vec![TriggerReason::Startup]);

        monitor.set_online();
        settle().await;
        monitor.set_offline();
        settle().await;
        monitor.set_online();
        settle().await;

        assert_eq!(
            trigger.reasons(),
            vec![
                TriggerReason::Startup,
                TriggerReason::Reconnect,
                TriggerReason::Reconnect
            ]
        );
        handle.abort();
    }

    #[tokio::test]
    async fn going_offline_triggers_nothing() {
        let monitor = NetworkMonitor::online();
        let trigger = Arc::new(RecordingTrigger::default());
        let handle = monitor.spawn(trigger.clone());

        settle().await;
        monitor.set_offline();
        settle().await;

        assert_eq!(trigger.reasons(), vec![TriggerReason::Startup]);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn health_check_feeds_monitor() {
        let monitor = NetworkMonitor::online();
        let reachable = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = reachable.clone();
        let handle = spawn_health_check(monitor.clone(), Duration::from_secs(5), move || {
            let flag = flag.clone();
            async move { flag.load(std::sync::atomic::Ordering::SeqCst) }
        });

        settle().await;
        assert!(!monitor.is_online());

        reachable.store(true, std::sync::atomic::Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;
        assert!(monitor.is_online());
        handle.abort();
    }
}
