//! Data models for Tidemark

mod note;

pub use note::{next_timestamp, normalize_tags, NoteId, NoteRecord, OwnerId, SyncState};
