use std::sync::{PoisonError, RwLock};

use base64::{Engine, engine::general_purpose::STANDARD};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::core::{
    crypto::{self, KEY_SIZE},
    errors::{VaultSyncError, VaultSyncResult},
};

/// In-memory slot for the session's symmetric key.
///
/// The key is never persisted by this crate; it arrives from the key
/// material provider as an opaque exportable string and is dropped on
/// [`KeyChain::clear`]. Ciphertext at rest is meaningless without it.
#[derive(Default)]
pub struct KeyChain {
    key: RwLock<Option<[u8; KEY_SIZE]>>,
}

impl KeyChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a fresh random key and returns it in exportable form.
    pub fn generate_exportable() -> SecretString {
        let mut key = crypto::generate_key();
        let exported = STANDARD.encode(key);
        key.zeroize();
        SecretString::new(exported.into_boxed_str())
    }

    pub fn import(&self, exported: &SecretString) -> VaultSyncResult<()> {
        let mut decoded = STANDARD
            .decode(exported.expose_secret().as_bytes())
            .map_err(|_| VaultSyncError::InvalidKey)?;
        if decoded.len() != KEY_SIZE {
            decoded.zeroize();
            return Err(VaultSyncError::InvalidKey);
        }

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&decoded);
        decoded.zeroize();

        let mut slot = self.key.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.as_mut() {
            previous.zeroize();
        }
        *slot = Some(key);
        Ok(())
    }

    pub fn export(&self) -> VaultSyncResult<SecretString> {
        let slot = self.key.read().unwrap_or_else(PoisonError::into_inner);
        let key = slot.as_ref().ok_or(VaultSyncError::KeyUnavailable)?;
        Ok(SecretString::new(STANDARD.encode(key).into_boxed_str()))
    }

    pub fn current(&self) -> VaultSyncResult<[u8; KEY_SIZE]> {
        let slot = self.key.read().unwrap_or_else(PoisonError::into_inner);
        slot.ok_or(VaultSyncError::KeyUnavailable)
    }

    pub fn is_loaded(&self) -> bool {
        self.key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn clear(&self) {
        let mut slot = self.key.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(key) = slot.as_mut() {
            key.zeroize();
        }
        *slot = None;
    }
}
