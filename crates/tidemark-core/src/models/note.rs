//! Note model

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a note, using UUID v7 (time-sortable)
///
/// Generated on the client and used as the idempotency key for every remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identifies the user owning a set of notes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create an owner id, trimming surrounding whitespace
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Whether the local copy still has changes the remote has not acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Dirty,
    Synced,
}

impl SyncState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dirty => "dirty",
            Self::Synced => "synced",
        }
    }
}

impl FromStr for SyncState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dirty" => Ok(Self::Dirty),
            "synced" => Ok(Self::Synced),
            other => Err(format!("unknown sync state '{other}'")),
        }
    }
}

/// A note as stored locally and exchanged with the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    /// Unique identifier, never changes
    pub id: NoteId,
    /// Owning user
    pub owner_id: OwnerId,
    pub title: String,
    pub body: String,
    /// Lowercase tag set
    pub tags: BTreeSet<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Logical timestamp (Unix ms), the only input to conflict resolution
    pub updated_at: i64,
    /// Deleted locally or remotely but not yet purged
    pub tombstone: bool,
    pub sync_state: SyncState,
    /// Consecutive remote rejections (local only)
    #[serde(default)]
    pub rejections: u32,
    /// Message of the latest remote rejection (local only)
    #[serde(default)]
    pub last_error: Option<String>,
}

impl NoteRecord {
    /// Create a new dirty note for `owner_id`
    #[must_use]
    pub fn new(
        owner_id: OwnerId,
        title: impl Into<String>,
        body: impl Into<String>,
        tags: impl IntoIterator<Item = String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: NoteId::new(),
            owner_id,
            title: title.into(),
            body: body.into(),
            tags: normalize_tags(tags),
            created_at: now,
            updated_at: now,
            tombstone: false,
            sync_state: SyncState::Dirty,
            rejections: 0,
            last_error: None,
        }
    }

    /// Record a local mutation: bump the logical clock and mark dirty.
    pub fn touch(&mut self) {
        self.updated_at = next_timestamp(self.updated_at);
        self.sync_state = SyncState::Dirty;
        self.rejections = 0;
        self.last_error = None;
    }

    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        matches!(self.sync_state, SyncState::Dirty)
    }

    /// Title if present, otherwise the first body line, truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        let source = if self.title.trim().is_empty() {
            self.body.lines().next().unwrap_or("")
        } else {
            self.title.as_str()
        };
        source.trim().chars().take(max_len).collect()
    }

    /// Check if both title and body are blank
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.body.trim().is_empty()
    }

    /// Case-insensitive substring match over title, body and tags
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&query)
            || self.body.to_lowercase().contains(&query)
            || self.tags.iter().any(|tag| tag.contains(&query))
    }
}

/// Next logical timestamp after `previous`: wall clock, but always strictly greater
#[must_use]
pub fn next_timestamp(previous: i64) -> i64 {
    chrono::Utc::now()
        .timestamp_millis()
        .max(previous.saturating_add(1))
}

/// Normalize tags: trimmed, lowercase, a leading `#` dropped, empties removed.
///
/// # Examples
///
/// ```
/// use tidemark_core::models::normalize_tags;
///
/// let tags = normalize_tags(vec![" #Rust ".to_string(), "rust".to_string(), String::new()]);
/// assert_eq!(tags.len(), 1);
/// assert!(tags.contains("rust"));
/// ```
#[must_use]
pub fn normalize_tags(tags: impl IntoIterator<Item = String>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|tag| tag.trim().trim_start_matches('#').trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> OwnerId {
        OwnerId::new("user-1")
    }

    #[test]
    fn test_note_id_unique() {
        let id1 = NoteId::new();
        let id2 = NoteId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_note_id_parse() {
        let id = NoteId::new();
        let parsed: NoteId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_note_new_is_dirty() {
        let note = NoteRecord::new(owner(), "Groceries", "milk", vec![]);
        assert_eq!(note.title, "Groceries");
        assert!(note.is_dirty());
        assert!(!note.tombstone);
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn test_touch_strictly_advances() {
        let mut note = NoteRecord::new(owner(), "t", "b", vec![]);
        note.updated_at = i64::MAX / 2;
        note.sync_state = SyncState::Synced;
        note.rejections = 3;

        let before = note.updated_at;
        note.touch();

        assert_eq!(note.updated_at, before + 1);
        assert!(note.is_dirty());
        assert_eq!(note.rejections, 0);
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(vec![
            "#Hello".to_string(),
            "hello".to_string(),
            "  work ".to_string(),
            "   ".to_string(),
        ]);
        assert_eq!(
            tags.into_iter().collect::<Vec<_>>(),
            vec!["hello".to_string(), "work".to_string()]
        );
    }

    #[test]
    fn test_owner_id_trims() {
        assert_eq!(OwnerId::new("  alice ").as_str(), "alice");
    }

    #[test]
    fn test_sync_state_text_roundtrip() {
        for state in [SyncState::Dirty, SyncState::Synced] {
            assert_eq!(state.as_str().parse::<SyncState>().unwrap(), state);
        }
        assert!("1".parse::<SyncState>().is_err());
    }

    #[test]
    fn test_title_preview_falls_back_to_body() {
        let titled = NoteRecord::new(owner(), "Plan", "first\nsecond", vec![]);
        assert_eq!(titled.title_preview(10), "Plan");

        let untitled = NoteRecord::new(owner(), "  ", "First line\nSecond", vec![]);
        assert_eq!(untitled.title_preview(5), "First");
    }

    #[test]
    fn test_matches_title_body_and_tags() {
        let note = NoteRecord::new(
            owner(),
            "Weekly Review",
            "Ship the sync engine",
            vec!["Work".to_string()],
        );
        assert!(note.matches("review"));
        assert!(note.matches("SYNC"));
        assert!(note.matches("wor"));
        assert!(!note.matches("holiday"));
    }
}
