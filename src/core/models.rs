use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Local content matches the last known server state.
    Synced,
    /// Local content differs from the last synced state and awaits push.
    Pending,
    /// Tombstone awaiting a server-side delete.
    Deleted,
}

/// The unit of storage and sync.
///
/// `login`, `password` and `binary_data` hold ciphertext produced by the
/// encryption boundary; `metadata` is stored in clear for display.
/// `version` is owned by the server: local writes never touch it, only a
/// successful server response does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    pub local_id: Uuid,
    pub server_id: Option<String>,
    pub login: String,
    pub password: String,
    pub metadata: BTreeMap<String, String>,
    pub binary_data: Option<Vec<u8>>,
    pub version: i64,
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SecretRecord {
    /// True for records the push phase must carry to the server.
    pub fn is_unsynced(&self) -> bool {
        matches!(self.sync_status, SyncStatus::Pending | SyncStatus::Deleted)
    }
}

/// Plaintext input for creating or updating a secret. Fields are encrypted
/// before they reach the record store.
pub struct NewSecret {
    pub login: String,
    pub password: SecretString,
    pub metadata: BTreeMap<String, String>,
    pub binary_data: Option<Vec<u8>>,
}

/// A record decrypted on demand for display. Never stored.
pub struct DecryptedSecret {
    pub local_id: Uuid,
    pub server_id: Option<String>,
    pub login: String,
    pub password: SecretString,
    pub metadata: BTreeMap<String, String>,
    pub binary_data: Option<Vec<u8>>,
    pub version: i64,
    pub sync_status: SyncStatus,
    pub updated_at: DateTime<Utc>,
}
