//! tidemark-core - Core library for Tidemark
//!
//! Offline-first notes: every edit lands in a local `SQLite` store first and
//! is reconciled with the remote notes API by the sync orchestrator when
//! connectivity allows. Used by the `tidemark` CLI.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod export;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use config::SyncConfig;
pub use engine::SyncEngine;
pub use error::{Error, LocalStoreError, RemoteError, Result};
pub use models::{NoteId, NoteRecord, OwnerId, SyncState};
pub use state::SyncStatus;
