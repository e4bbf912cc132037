use serde::Serialize;
use tidemark_core::config::DEFAULT_MAX_REJECTIONS;
use tidemark_core::db::LocalStore;

use crate::commands::common::{format_sync_timestamp, note_preview, open_store, CliContext};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub owner: String,
    pub remote_url: Option<String>,
    pub cursor: i64,
    pub active: usize,
    pub dirty: usize,
    pub parked: usize,
    pub errors: Vec<RejectedNote>,
}

#[derive(Debug, Serialize)]
pub struct RejectedNote {
    pub id: String,
    pub title: String,
    pub rejections: u32,
    pub last_error: String,
}

pub async fn run_status(
    retry_parked: bool,
    as_json: bool,
    context: &CliContext,
) -> Result<(), CliError> {
    let store = open_store(&context.db_path)?;

    if retry_parked {
        let cleared = store.clear_rejections(&context.owner).await?;
        if !as_json {
            println!("Cleared rejections on {cleared} note(s)");
        }
    }

    let report = collect_status(&store, context).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_status_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn collect_status(
    store: &dyn LocalStore,
    context: &CliContext,
) -> Result<StatusReport, CliError> {
    let max_rejections = context
        .sync_config()
        .map_or(DEFAULT_MAX_REJECTIONS, |config| config.max_rejections);

    let cursor = store.get_cursor(&context.owner).await?;
    let active = store.list_active(&context.owner).await?.len();
    let dirty = store.list_dirty(&context.owner).await?;

    let parked = dirty
        .iter()
        .filter(|note| note.rejections >= max_rejections)
        .count();
    let errors = dirty
        .iter()
        .filter_map(|note| {
            note.last_error.as_ref().map(|error| RejectedNote {
                id: note.id.to_string(),
                title: note_preview(note, 40),
                rejections: note.rejections,
                last_error: error.clone(),
            })
        })
        .collect();

    Ok(StatusReport {
        owner: context.owner.to_string(),
        remote_url: context.remote_url.clone(),
        cursor,
        active,
        dirty: dirty.len(),
        parked,
        errors,
    })
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let last_pull = if report.cursor > 0 {
        format_sync_timestamp(report.cursor)
    } else {
        "never".to_string()
    };

    let mut lines = vec![
        format!("owner:     {}", report.owner),
        format!(
            "remote:    {}",
            report.remote_url.as_deref().unwrap_or("not configured")
        ),
        format!("last pull: {last_pull}"),
        format!("notes:     {} active, {} waiting to sync", report.active, report.dirty),
    ];
    if report.parked > 0 {
        lines.push(format!(
            "parked:    {} (run `tidemark status --retry-parked`)",
            report.parked
        ));
    }
    for error in &report.errors {
        let short_id = error.id.chars().take(13).collect::<String>();
        lines.push(format!(
            "  {short_id} {} [{}x] {}",
            error.title, error.rejections, error.last_error
        ));
    }
    lines
}
