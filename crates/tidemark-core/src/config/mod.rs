//! Sync engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};

/// Default interval between timer-driven passes
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Default bound on a single remote call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Rejections after which a dirty record is parked
pub const DEFAULT_MAX_REJECTIONS: u32 = 5;

/// Configuration for the remote store and the sync orchestrator
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base URL of the notes API
    #[serde(default)]
    pub url: Option<String>,
    /// Bearer token for the notes API
    #[serde(default, skip_serializing)]
    pub auth_token: Option<String>,
    /// Interval for automatic background passes (None = timer disabled)
    #[serde(default = "default_sync_interval")]
    pub sync_interval: Option<Duration>,
    #[serde(default = "default_call_timeout")]
    pub call_timeout: Duration,
    #[serde(default = "default_max_rejections")]
    pub max_rejections: u32,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncConfig")
            .field("url", &self.url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("sync_interval", &self.sync_interval)
            .field("call_timeout", &self.call_timeout)
            .field("max_rejections", &self.max_rejections)
            .finish()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            url: None,
            auth_token: None,
            sync_interval: default_sync_interval(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_rejections: DEFAULT_MAX_REJECTIONS,
        }
    }
}

impl SyncConfig {
    /// Create a sync config pointing at a remote API
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: normalize_text_option(Some(url.into())),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = normalize_text_option(Some(token.into()));
        self
    }

    /// Set the automatic sync interval
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Disable timer-driven passes
    #[must_use]
    pub const fn without_auto_sync(mut self) -> Self {
        self.sync_interval = None;
        self
    }

    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Number of rejections before a record is parked (minimum 1)
    #[must_use]
    pub fn with_max_rejections(mut self, max_rejections: u32) -> Self {
        self.max_rejections = max_rejections.max(1);
        self
    }

    /// Whether a usable remote endpoint is configured
    pub fn is_configured(&self) -> bool {
        self.url.as_deref().is_some_and(is_http_url)
    }
}

#[allow(clippy::unnecessary_wraps)]
const fn default_sync_interval() -> Option<Duration> {
    Some(DEFAULT_SYNC_INTERVAL)
}

const fn default_call_timeout() -> Duration {
    DEFAULT_CALL_TIMEOUT
}

const fn default_max_rejections() -> u32 {
    DEFAULT_MAX_REJECTIONS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_timer_and_bound_calls() {
        let config = SyncConfig::default();
        assert_eq!(config.sync_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.call_timeout, Duration::from_secs(10));
        assert_eq!(config.max_rejections, 5);
        assert!(!config.is_configured());
    }

    #[test]
    fn builder_normalizes_values() {
        let config = SyncConfig::new(" https://notes.example.com ")
            .with_auth_token("  ")
            .without_auto_sync()
            .with_max_rejections(0);

        assert_eq!(config.url.as_deref(), Some("https://notes.example.com"));
        assert_eq!(config.auth_token, None);
        assert_eq!(config.sync_interval, None);
        assert_eq!(config.max_rejections, 1);
        assert!(config.is_configured());
    }

    #[test]
    fn non_http_url_is_not_configured() {
        assert!(!SyncConfig::new("notes.example.com").is_configured());
    }

    #[test]
    fn token_is_redacted_and_never_serialized() {
        let config = SyncConfig::new("https://notes.example.com").with_auth_token("secret");

        assert!(!format!("{config:?}").contains("secret"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
