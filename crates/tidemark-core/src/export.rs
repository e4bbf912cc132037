//! Note export helpers.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::models::NoteRecord;

/// Export output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

/// Serializable note representation used in JSON and Markdown exports.
///
/// Sync bookkeeping is left out; an export is a snapshot of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportNote {
    pub id: String,
    pub title: String,
    pub body: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub tags: Vec<String>,
}

impl From<&NoteRecord> for ExportNote {
    fn from(note: &NoteRecord) -> Self {
        Self {
            id: note.id.to_string(),
            title: note.title.clone(),
            body: note.body.clone(),
            created_at: note.created_at,
            updated_at: note.updated_at,
            tags: note.tags.iter().cloned().collect(),
        }
    }
}

/// Render notes as pretty-printed JSON.
pub fn render_json_export(notes: &[NoteRecord]) -> serde_json::Result<String> {
    let items = notes.iter().map(ExportNote::from).collect::<Vec<_>>();
    serde_json::to_string_pretty(&items)
}

/// Render notes in Markdown with frontmatter blocks.
#[must_use]
pub fn render_markdown_export(notes: &[NoteRecord]) -> String {
    let mut output = String::new();

    for (index, note) in notes.iter().enumerate() {
        if index > 0 {
            output.push('\n');
        }

        let export_note = ExportNote::from(note);
        let _ = writeln!(output, "---");
        let _ = writeln!(output, "id: {}", export_note.id);
        let _ = writeln!(output, "title: {}", yaml_scalar(&export_note.title));
        let _ = writeln!(output, "created_at: {}", export_note.created_at);
        let _ = writeln!(output, "updated_at: {}", export_note.updated_at);
        let _ = writeln!(output, "tags:");
        for tag in export_note.tags {
            let _ = writeln!(output, "  - {tag}");
        }
        let _ = writeln!(output, "---");
        let _ = writeln!(output);
        if !export_note.title.trim().is_empty() {
            let _ = writeln!(output, "# {}", export_note.title.trim());
            let _ = writeln!(output);
        }
        output.push_str(&export_note.body);
        output.push('\n');
    }

    output
}

/// Render notes based on selected export format.
pub fn render_notes_export(
    notes: &[NoteRecord],
    format: ExportFormat,
) -> serde_json::Result<String> {
    match format {
        ExportFormat::Json => render_json_export(notes),
        ExportFormat::Markdown => Ok(render_markdown_export(notes)),
    }
}

/// Build a deterministic default file name for export flows.
#[must_use]
pub fn suggested_export_file_name(format: ExportFormat, timestamp_ms: i64) -> String {
    format!("tidemark-export-{timestamp_ms}.{}", format.extension())
}

/// Quote a frontmatter value when it would not survive as a plain scalar
fn yaml_scalar(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.trim() != value
        || value.contains(&[':', '#', '"', '\'', '\n'][..])
        || value.starts_with(&['-', '[', '{', '&', '*', '!', '|', '>', '%', '@'][..]);
    if needs_quotes {
        serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
    } else {
        value.to_string()
    }
}
