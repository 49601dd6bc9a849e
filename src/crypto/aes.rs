use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use aes_gcm::aead::rand_core::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};
use crate::error::{AppError, Result};

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// A secure key wrapper that ensures the key is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecureKey([u8; KEY_SIZE]);

impl SecureKey {
    /// Creates a new `SecureKey` from a byte slice.
    ///
    /// # Arguments
    ///
    /// * `key` - Exactly 32 bytes of AES-256 key material.
    pub fn from_slice(key: &[u8]) -> Result<Self> {
        let key: [u8; KEY_SIZE] = key
            .try_into()
            .map_err(|_| AppError::Crypto("Invalid master key size".to_string()))?;
        Ok(Self(key))
    }

    /// Returns a reference to the key as a byte array.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypts `plaintext` with AES-256-GCM and returns `ciphertext || nonce`.
///
/// # Arguments
///
/// * `key` - The AES-256 key.
/// * `plaintext` - The data to seal.
pub fn seal(key: &SecureKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from(nonce_bytes);

    let mut sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| AppError::Crypto(format!("Encryption failed: {}", e)))?;

    sealed.extend_from_slice(&nonce_bytes);
    Ok(sealed)
}

/// Opens a blob produced by [`seal`].
///
/// # Arguments
///
/// * `key` - The AES-256 key.
/// * `sealed` - `ciphertext || nonce`, with the 12-byte nonce at the end.
pub fn open(key: &SecureKey, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() <= NONCE_SIZE {
        return Err(AppError::Crypto("Sealed blob is too short".to_string()));
    }

    let (ciphertext, nonce) = sealed.split_at(sealed.len() - NONCE_SIZE);
    let nonce: [u8; NONCE_SIZE] = nonce
        .try_into()
        .map_err(|_| AppError::Crypto("Invalid nonce size".to_string()))?;

    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .decrypt(&Nonce::from(nonce), ciphertext)
        .map_err(|e| AppError::Crypto(format!("Decryption failed: {}", e)))
}
