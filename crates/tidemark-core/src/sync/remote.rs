//! Contract of the remote store the engine reconciles against.

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::models::{NoteId, NoteRecord, OwnerId};

/// Result type for remote store calls
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Keyed CRUD plus change listing, all keyed by the client-generated note id.
///
/// Every call is idempotent by id, which is what makes retrying after a
/// `RemoteError::Network` safe.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create or replace the record with `record.id`
    async fn upsert(&self, owner: &OwnerId, record: &NoteRecord) -> RemoteResult<NoteRecord>;

    /// Delete by id; deleting an unknown or already deleted id succeeds
    async fn delete(&self, owner: &OwnerId, id: &NoteId) -> RemoteResult<()>;

    /// Records with `updated_at > cursor`, ascending by `updated_at`
    async fn list_since(&self, owner: &OwnerId, cursor: i64) -> RemoteResult<Vec<NoteRecord>>;
}
