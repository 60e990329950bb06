use thiserror::Error;

pub type VaultSyncResult<T> = Result<T, VaultSyncError>;

#[derive(Debug, Error)]
pub enum VaultSyncError {
    #[error("encryption key not loaded")]
    KeyUnavailable,
    #[error("invalid key material")]
    InvalidKey,
    #[error("crypto operation failed")]
    Crypto,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("version conflict")]
    VersionConflict,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("chunk transfer aborted: {0}")]
    ChunkTransferAborted(String),
    #[error("item not found")]
    NotFound,
    #[error("serialization failed")]
    Serialization,
    #[error("storage operation failed")]
    Storage,
}

impl VaultSyncError {
    /// Version conflicts are an expected sync outcome; they are routed to
    /// the conflict queue instead of being surfaced as failures.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict)
    }
}

impl From<chacha20poly1305::aead::Error> for VaultSyncError {
    fn from(_: chacha20poly1305::aead::Error) -> Self {
        Self::Crypto
    }
}

impl From<serde_json::Error> for VaultSyncError {
    fn from(_: serde_json::Error) -> Self {
        Self::Serialization
    }
}

impl From<base64::DecodeError> for VaultSyncError {
    fn from(_: base64::DecodeError) -> Self {
        Self::Serialization
    }
}

impl From<sqlx::Error> for VaultSyncError {
    fn from(_: sqlx::Error) -> Self {
        Self::Storage
    }
}

impl From<reqwest::Error> for VaultSyncError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.without_url().to_string())
    }
}
