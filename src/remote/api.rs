use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::VaultSyncResult;

/// A secret as the remote authority serializes it. `binary_data` is only
/// present when the payload is small enough to travel inline; for larger
/// attachments sync responses carry `binary_data_size` instead, signalling
/// a chunked download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretWire {
    pub id: String,
    pub login: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_data_size: Option<i64>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSecretRequest {
    pub login: String,
    pub password: String,
    pub metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_data: Option<String>,
}

/// Update carries the caller's current `version` as the optimistic
/// precondition; the server answers 409 when it has moved on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSecretRequest {
    pub login: String,
    pub password: String,
    pub metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_data: Option<String>,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub secrets: Vec<SecretWire>,
    pub server_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitChunkedUploadRequest {
    pub total_chunks: usize,
    pub total_size: u64,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitChunkedUploadResponse {
    pub upload_id: String,
    pub secret_id: String,
}

/// `data` is the base64 encoding of the raw chunk bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkRequest {
    pub upload_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkResponse {
    pub chunk_index: usize,
    pub received: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeChunkedUploadRequest {
    pub upload_id: String,
    pub login: String,
    pub password: String,
    pub metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadChunkResponse {
    pub chunk_index: usize,
    pub data: String,
    pub total_chunks: usize,
}

/// The remote authority as the sync engine sees it. Implementations carry
/// their own authentication; a version-conflict response must surface as
/// [`crate::core::errors::VaultSyncError::VersionConflict`], distinct from
/// transport failures.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn create_secret(&self, request: &CreateSecretRequest) -> VaultSyncResult<SecretWire>;
    async fn get_secret(&self, id: &str) -> VaultSyncResult<SecretWire>;
    async fn update_secret(
        &self,
        id: &str,
        request: &UpdateSecretRequest,
    ) -> VaultSyncResult<SecretWire>;
    async fn delete_secret(&self, id: &str) -> VaultSyncResult<()>;

    /// Server changes since `since` (the persisted sync cursor); `None`
    /// requests the full history.
    async fn sync_since(&self, since: Option<&str>) -> VaultSyncResult<SyncResponse>;

    async fn init_chunked_upload(
        &self,
        request: &InitChunkedUploadRequest,
    ) -> VaultSyncResult<InitChunkedUploadResponse>;
    async fn upload_chunk(
        &self,
        secret_id: &str,
        request: &UploadChunkRequest,
    ) -> VaultSyncResult<UploadChunkResponse>;
    async fn finalize_chunked_upload(
        &self,
        secret_id: &str,
        request: &FinalizeChunkedUploadRequest,
    ) -> VaultSyncResult<SecretWire>;
    async fn download_chunk(
        &self,
        secret_id: &str,
        chunk_index: usize,
    ) -> VaultSyncResult<DownloadChunkResponse>;
}
