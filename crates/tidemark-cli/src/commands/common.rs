use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tidemark_core::db::SqliteLocalStore;
use tidemark_core::models::normalize_tags;
use tidemark_core::services::NoteService;
use tidemark_core::util::now_millis;
use tidemark_core::{NoteId, NoteRecord, OwnerId, SyncConfig};

use crate::config_profiles::{normalize_text_option, CliProfilesConfig};
use crate::error::CliError;

const DEFAULT_OWNER: &str = "local";

/// Everything a command needs to know about where notes live
#[derive(Debug, Clone)]
pub struct CliContext {
    pub db_path: PathBuf,
    pub owner: OwnerId,
    pub remote_url: Option<String>,
    pub remote_token: Option<String>,
}

impl CliContext {
    pub fn new(db_path: impl Into<PathBuf>, owner: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            owner: OwnerId::new(owner),
            remote_url: None,
            remote_token: None,
        }
    }

    /// Resolve flags, environment and the profile config.
    ///
    /// Flags win over `TIDEMARK_*` variables, which win over the profile.
    pub fn resolve(
        cli_db_path: Option<PathBuf>,
        cli_owner: Option<String>,
        cli_profile: Option<&str>,
    ) -> Result<Self, CliError> {
        let config = CliProfilesConfig::load().map_err(CliError::Config)?;
        let profile_name = config.resolve_profile_name(cli_profile);
        let profile = config.profile(&profile_name).cloned().unwrap_or_default();

        let owner = normalize_text_option(cli_owner)
            .or_else(|| normalize_text_option(env::var("TIDEMARK_OWNER").ok()))
            .or_else(|| profile.owner())
            .unwrap_or_else(|| DEFAULT_OWNER.to_string());
        let remote_url = normalize_text_option(env::var("TIDEMARK_REMOTE_URL").ok())
            .or_else(|| profile.remote_url());

        let mut context = Self::new(resolve_db_path(cli_db_path)?, owner);
        context.remote_url = remote_url;
        context.remote_token = normalize_text_option(env::var("TIDEMARK_REMOTE_TOKEN").ok());
        Ok(context)
    }

    /// Sync configuration when a remote URL is known
    pub fn sync_config(&self) -> Option<SyncConfig> {
        let url = self.remote_url.clone()?;
        let mut config = SyncConfig::new(url);
        if let Some(token) = self.remote_token.clone() {
            config = config.with_auth_token(token);
        }
        config.is_configured().then_some(config)
    }
}

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub body: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
    pub tags: Vec<String>,
    pub sync_state: String,
}

pub fn open_store(db_path: &Path) -> Result<SqliteLocalStore, CliError> {
    Ok(SqliteLocalStore::open(db_path)?)
}

/// Local-only note service; the CLI syncs explicitly through `tidemark sync`
pub fn open_note_service(context: &CliContext) -> Result<NoteService, CliError> {
    let store = open_store(&context.db_path)?;
    Ok(NoteService::new(Arc::new(store)))
}

pub async fn list_notes(
    limit: usize,
    tag: Option<&str>,
    context: &CliContext,
) -> Result<Vec<NoteRecord>, CliError> {
    let service = open_note_service(context)?;
    let notes = service.list_active(&context.owner).await?;

    let tag = tag.and_then(|tag| normalize_tags([tag.to_string()]).into_iter().next());
    Ok(notes
        .into_iter()
        .filter(|note| tag.as_ref().is_none_or(|tag| note.tags.contains(tag)))
        .take(limit)
        .collect())
}

pub async fn list_all_notes(context: &CliContext) -> Result<Vec<NoteRecord>, CliError> {
    let service = open_note_service(context)?;
    Ok(service.list_active(&context.owner).await?)
}

pub async fn search_notes(
    query: &str,
    limit: usize,
    context: &CliContext,
) -> Result<Vec<NoteRecord>, CliError> {
    let service = open_note_service(context)?;
    Ok(service.search(&context.owner, query, limit).await?)
}

/// Find an active note of `owner` by full id or unique id prefix
pub async fn resolve_note(
    note_query: &str,
    service: &NoteService,
    owner: &OwnerId,
) -> Result<NoteRecord, CliError> {
    if let Ok(note_id) = note_query.parse::<NoteId>() {
        let found = service.get(&note_id).await?;
        if let Some(note) = found.filter(|note| note.owner_id == *owner) {
            return Ok(note);
        }
    }

    let prefix = note_query.to_lowercase();
    let mut matching = service
        .list_active(owner)
        .await?
        .into_iter()
        .filter(|note| note.id.to_string().starts_with(&prefix))
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::NoteNotFound(note_query.to_string())),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|note| note.id.to_string().chars().take(13).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{note_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn format_note_lines(notes: &[NoteRecord]) -> Vec<String> {
    let now_ms = now_millis();
    notes
        .iter()
        .map(|note| {
            let id = note.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let marker = if note.is_dirty() { "*" } else { " " };
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.updated_at, now_ms);
            let tags = render_tags(note);

            if tags.is_empty() {
                format!("{short_id:<13}{marker} {preview:<40}  {relative_time}")
            } else {
                format!("{short_id:<13}{marker} {preview:<40}  {relative_time:<10}  {tags}")
            }
        })
        .collect()
}

pub fn note_to_list_item(note: &NoteRecord) -> NoteListItem {
    let now_ms = now_millis();

    NoteListItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        preview: note_preview(note, 80),
        body: note.body.clone(),
        created_at: note.created_at,
        updated_at: note.updated_at,
        relative_time: format_relative_time(note.updated_at, now_ms),
        tags: note.tags.iter().cloned().collect(),
        sync_state: note.sync_state.as_str().to_string(),
    }
}

pub fn note_preview(note: &NoteRecord, max_chars: usize) -> String {
    let first_line = note.title_preview(usize::MAX);
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn render_tags(note: &NoteRecord) -> String {
    note.tags
        .iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

/// Split free text into a title (first line) and a body (the rest)
pub fn split_title_body(content: &str) -> (String, String) {
    let content = content.trim();
    match content.split_once('\n') {
        Some((title, body)) => (title.trim().to_string(), body.trim().to_string()),
        None => (content.to_string(), String::new()),
    }
}

/// Text shown in the editor for an existing note
pub fn note_editor_text(note: &NoteRecord) -> String {
    if note.body.is_empty() {
        note.title.clone()
    } else {
        format!("{}\n\n{}", note.title, note.body)
    }
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_search_query(query: &str) -> Result<String, CliError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptySearchQuery)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input() -> Result<Option<String>, CliError> {
    capture_editor_input_with_initial("")
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("tidemark-note-{}-{now}.md", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    match cli_db_path.or_else(|| env::var_os("TIDEMARK_DB_PATH").map(PathBuf::from)) {
        Some(path) => Ok(path),
        None => default_db_path(),
    }
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("tidemark").join("tidemark.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}
