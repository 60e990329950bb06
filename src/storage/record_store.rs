use async_trait::async_trait;
use uuid::Uuid;

use crate::core::{
    errors::VaultSyncResult,
    models::{SecretRecord, SyncStatus},
};

pub const SYNC_CURSOR_KEY: &str = "lastSyncTime";

/// Persistent keyed store of secret records and sync metadata.
///
/// Every mutation is durable before the call returns; a subsequent read
/// never observes a partial write. The store does not serialize writers
/// itself — the sync engine's cycle guard provides single-writer
/// discipline for sync-driven mutations.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn init(&self) -> VaultSyncResult<()>;

    async fn add(&self, record: &SecretRecord) -> VaultSyncResult<()>;
    /// Upsert keyed by `local_id`.
    async fn put(&self, record: &SecretRecord) -> VaultSyncResult<()>;
    async fn delete(&self, local_id: Uuid) -> VaultSyncResult<()>;

    async fn get(&self, local_id: Uuid) -> VaultSyncResult<Option<SecretRecord>>;
    async fn get_by_server_id(&self, server_id: &str) -> VaultSyncResult<Option<SecretRecord>>;

    /// Records visible to the UI: everything except tombstones.
    async fn list_active(&self) -> VaultSyncResult<Vec<SecretRecord>>;
    async fn query_by_sync_status(&self, status: SyncStatus)
    -> VaultSyncResult<Vec<SecretRecord>>;
    /// Pending and deleted records in stable iteration order, for the push
    /// phase.
    async fn list_unsynced(&self) -> VaultSyncResult<Vec<SecretRecord>>;
    async fn unsynced_count(&self) -> VaultSyncResult<usize>;

    async fn sync_cursor(&self) -> VaultSyncResult<Option<String>>;
    async fn set_sync_cursor(&self, value: &str) -> VaultSyncResult<()>;
}
