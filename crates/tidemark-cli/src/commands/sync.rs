use std::sync::Arc;
use std::time::Duration;

use tidemark_core::db::LocalStore;
use tidemark_core::sync::{
    spawn_health_check, HttpRemoteStore, NetworkMonitor, PassOutcome, SkipReason, SyncReport,
};
use tidemark_core::{RemoteError, SyncConfig, SyncEngine};

use crate::commands::common::{open_store, CliContext};
use crate::error::CliError;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(15);

pub async fn run_sync(watch: bool, context: &CliContext) -> Result<(), CliError> {
    let config = context.sync_config().ok_or(CliError::SyncNotConfigured)?;
    let url = config.url.clone().ok_or(CliError::SyncNotConfigured)?;
    let remote = Arc::new(HttpRemoteStore::new(
        url,
        config.auth_token.clone(),
        config.call_timeout,
    )?);
    let store: Arc<dyn LocalStore> = Arc::new(open_store(&context.db_path)?);

    if watch {
        run_sync_watch(store, remote, config, context).await
    } else {
        run_sync_once(store, remote, config, context).await
    }
}

async fn run_sync_once(
    store: Arc<dyn LocalStore>,
    remote: Arc<HttpRemoteStore>,
    config: SyncConfig,
    context: &CliContext,
) -> Result<(), CliError> {
    let engine = SyncEngine::new(
        store,
        remote,
        NetworkMonitor::online(),
        config.without_auto_sync(),
    );

    match engine.sync_now(&context.owner).await? {
        PassOutcome::Completed(report) => {
            for line in format_sync_report(&report) {
                println!("{line}");
            }
        }
        PassOutcome::Skipped(reason) => println!("{}", skip_message(reason)),
    }
    Ok(())
}

async fn run_sync_watch(
    store: Arc<dyn LocalStore>,
    remote: Arc<HttpRemoteStore>,
    config: SyncConfig,
    context: &CliContext,
) -> Result<(), CliError> {
    let monitor = NetworkMonitor::offline();
    let check_remote = Arc::clone(&remote);
    let health_check = spawn_health_check(monitor.clone(), HEALTH_CHECK_INTERVAL, move || {
        let remote = Arc::clone(&check_remote);
        async move { is_reachable(&remote.ping().await) }
    });

    let mut engine = SyncEngine::new(store, remote, monitor, config);
    engine.orchestrator().register_owner(&context.owner);
    let mut status = engine.orchestrator().subscribe();
    engine.start();
    println!("Watching for changes as '{}' (Ctrl-C to stop)", context.owner);

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                tracing::debug!(owner = %context.owner, status = %current, "Sync status changed");
                println!("sync: {current}");
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    health_check.abort();
    engine.shutdown().await;
    Ok(())
}

/// Only transport failures mean the remote is unreachable; an auth or
/// request error still proves connectivity.
pub fn is_reachable(result: &Result<(), RemoteError>) -> bool {
    !matches!(result, Err(RemoteError::Network(_) | RemoteError::Timeout(_)))
}

pub const fn skip_message(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::InFlight => "A sync pass is already running",
        SkipReason::Offline => "Offline; local changes will sync on reconnect",
    }
}

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Sync completed: {} pushed, {} deleted, {} pulled",
        report.pushed, report.deleted, report.pulled
    )];

    if report.superseded > 0 {
        lines.push(format!(
            "{} local change(s) replaced by newer remote versions",
            report.superseded
        ));
    }
    if report.rejected > 0 {
        lines.push(format!("{} note(s) rejected by the remote", report.rejected));
    }
    if report.parked > 0 {
        lines.push(format!(
            "{} note(s) parked after repeated rejections; run `tidemark status --retry-parked`",
            report.parked
        ));
    }
    if report.failed > 0 {
        lines.push(format!("{} push(es) timed out", report.failed));
    }
    if report.stale > 0 {
        lines.push(format!(
            "{} remote change(s) skipped because of newer local edits",
            report.stale
        ));
    }
    if report.pending > 0 {
        lines.push(format!("{} note(s) still waiting to sync", report.pending));
    }
    lines
}
