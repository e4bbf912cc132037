//! Application-facing services.

mod notes;

pub use notes::{NewNote, NoteChanges, NoteService};
