use base64::{Engine, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use zeroize::Zeroize;

use crate::core::errors::{VaultSyncError, VaultSyncResult};

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;

pub fn generate_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    rand::rng().fill_bytes(&mut key);
    key
}

/// Encrypts a raw byte buffer and returns `nonce || ciphertext`.
///
/// Every call draws a fresh random nonce; callers encrypting several
/// fields of one record get independent nonces per field.
pub fn encrypt_bytes(key_bytes: &[u8; KEY_SIZE], plaintext: &[u8]) -> VaultSyncResult<Vec<u8>> {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);

    let key = Key::from_slice(key_bytes);
    let cipher = ChaCha20Poly1305::new(key);
    let ciphertext = cipher.encrypt(Nonce::from_slice(&nonce), plaintext)?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(combined)
}

/// Decrypts a `nonce || ciphertext` buffer produced by [`encrypt_bytes`].
/// A truncated buffer or a failed authentication tag surfaces as
/// [`VaultSyncError::DecryptionFailed`], never as garbage plaintext.
pub fn decrypt_bytes(key_bytes: &[u8; KEY_SIZE], data: &[u8]) -> VaultSyncResult<Vec<u8>> {
    if data.len() <= NONCE_SIZE {
        return Err(VaultSyncError::DecryptionFailed);
    }
    let (nonce, ciphertext) = data.split_at(NONCE_SIZE);

    let key = Key::from_slice(key_bytes);
    let cipher = ChaCha20Poly1305::new(key);
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| VaultSyncError::DecryptionFailed)
}

/// Encrypts a text field into a base64 string of `nonce || ciphertext`.
pub fn encrypt_field(key_bytes: &[u8; KEY_SIZE], plaintext: &str) -> VaultSyncResult<String> {
    let combined = encrypt_bytes(key_bytes, plaintext.as_bytes())?;
    Ok(STANDARD.encode(combined))
}

pub fn decrypt_field(key_bytes: &[u8; KEY_SIZE], ciphertext: &str) -> VaultSyncResult<String> {
    let combined = STANDARD
        .decode(ciphertext.as_bytes())
        .map_err(|_| VaultSyncError::DecryptionFailed)?;
    let mut plaintext = decrypt_bytes(key_bytes, &combined)?;
    let text = String::from_utf8(plaintext.clone()).map_err(|_| VaultSyncError::DecryptionFailed);
    plaintext.zeroize();
    text
}

pub fn zeroize_vec(buffer: &mut Vec<u8>) {
    buffer.zeroize();
}
