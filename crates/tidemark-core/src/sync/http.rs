//! HTTP client for the managed notes API.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::remote::{RemoteResult, RemoteStore};
use crate::error::{Error, RemoteError};
use crate::models::{NoteId, NoteRecord, OwnerId, SyncState};
use crate::util::{compact_text, normalize_text_option};

/// Remote store speaking JSON over HTTP.
///
/// Routes:
/// - `PUT    {base}/v1/owners/{owner}/notes/{id}`
/// - `DELETE {base}/v1/owners/{owner}/notes/{id}`
/// - `GET    {base}/v1/owners/{owner}/notes?since={cursor}`
/// - `GET    {base}/v1/health`
#[derive(Clone)]
pub struct HttpRemoteStore {
    base_url: Url,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteStore")
            .field("base_url", &self.base_url.as_str())
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpRemoteStore {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::InvalidInput(format!("cannot build HTTP client: {error}")))?;

        Ok(Self {
            base_url,
            auth_token: normalize_text_option(auth_token),
            client,
        })
    }

    /// Lightweight reachability check used by the connectivity health check
    pub async fn ping(&self) -> RemoteResult<()> {
        let url = self.url(&["v1", "health"])?;
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await.map(|_| ())
    }

    fn url(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::Network(format!("invalid base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn note_url(&self, owner: &OwnerId, id: &NoteId) -> RemoteResult<Url> {
        self.url(&["v1", "owners", owner.as_str(), "notes", &id.as_str()])
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header(reqwest::header::ACCEPT, "application/json");
        match self.auth_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn upsert(&self, owner: &OwnerId, record: &NoteRecord) -> RemoteResult<NoteRecord> {
        let url = self.note_url(owner, &record.id)?;
        let response = self
            .authorized(self.client.put(url))
            .json(&WireNote::from(record))
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response).await?;
        let stored = response
            .json::<WireNote>()
            .await
            .map_err(|error| RemoteError::Network(format!("invalid upsert response: {error}")))?;
        Ok(stored.into_record())
    }

    async fn delete(&self, owner: &OwnerId, id: &NoteId) -> RemoteResult<()> {
        let url = self.note_url(owner, id)?;
        let response = self
            .authorized(self.client.delete(url))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response).await.map(|_| ())
    }

    async fn list_since(&self, owner: &OwnerId, cursor: i64) -> RemoteResult<Vec<NoteRecord>> {
        let mut url = self.url(&["v1", "owners", owner.as_str(), "notes"])?;
        url.query_pairs_mut().append_pair("since", &cursor.to_string());

        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response).await?;
        let notes = response
            .json::<Vec<WireNote>>()
            .await
            .map_err(|error| RemoteError::Network(format!("invalid change list: {error}")))?;

        let mut records = notes
            .into_iter()
            .map(WireNote::into_record)
            .filter(|record| record.updated_at > cursor)
            .collect::<Vec<_>>();
        records.sort_by_key(|record| (record.updated_at, record.id));
        Ok(records)
    }
}

/// Note as exchanged with the API; local bookkeeping fields never leave the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct WireNote {
    id: NoteId,
    owner_id: OwnerId,
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    tags: BTreeSet<String>,
    created_at: i64,
    updated_at: i64,
    #[serde(default)]
    tombstone: bool,
}

impl From<&NoteRecord> for WireNote {
    fn from(record: &NoteRecord) -> Self {
        Self {
            id: record.id,
            owner_id: record.owner_id.clone(),
            title: record.title.clone(),
            body: record.body.clone(),
            tags: record.tags.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            tombstone: record.tombstone,
        }
    }
}

impl WireNote {
    fn into_record(self) -> NoteRecord {
        NoteRecord {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            body: self.body,
            tags: self.tags,
            created_at: self.created_at,
            updated_at: self.updated_at,
            tombstone: self.tombstone,
            sync_state: SyncState::Synced,
            rejections: 0,
            last_error: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    RemoteError::Network(error.to_string())
}

async fn check_status(response: reqwest::Response) -> RemoteResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

/// Map a non-success status to the error taxonomy the orchestrator acts on
fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let message = parse_api_error(status, body);
    match status {
        // 403 refuses one record; only 401 invalidates the session
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            RemoteError::Network(message)
        }
        status if status.is_server_error() => RemoteError::Network(message),
        _ => RemoteError::Rejected(message),
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> crate::Result<Url> {
    let endpoint = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("remote URL must not be empty".to_string()))?;
    if !crate::util::is_http_url(&endpoint) {
        return Err(Error::InvalidInput(
            "remote URL must include http:// or https://".to_string(),
        ));
    }
    Url::parse(endpoint.trim_end_matches('/'))
        .map_err(|error| Error::InvalidInput(format!("invalid remote URL: {error}")))
}
