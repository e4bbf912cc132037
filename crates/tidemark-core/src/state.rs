//! Observable sync status.

use std::fmt;

/// Sync status published by the orchestrator for display.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SyncStatus {
    /// No pass has run yet
    #[default]
    Idle,
    /// Connectivity is down or the remote is unreachable
    Offline,
    Syncing,
    /// Last pass completed and nothing is left to push
    Synced,
    /// Last pass completed but some records are still dirty
    Pending,
    /// A pass-level failure the user has to act on
    Error(String),
}

impl SyncStatus {
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Offline => write!(f, "offline"),
            Self::Syncing => write!(f, "syncing"),
            Self::Synced => write!(f, "synced"),
            Self::Pending => write!(f, "sync pending"),
            Self::Error(message) => write!(f, "error: {message}"),
        }
    }
}
