//! Symmetric encryption of chat payloads.
//!
//! The session key is a random alphanumeric passphrase shared during the
//! link handshake. A 32-byte cipher key is derived from it with BLAKE3, and
//! payloads travel as base64(nonce || ciphertext) under XChaCha20-Poly1305.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::{distributions::Alphanumeric, Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::constants::{KDF_CONTEXT_SESSION_KEY, NONCE_SIZE, SESSION_KEY_LEN};
use crate::error::CryptoError;

/// The symmetric secret active for the current chat session.
/// Exactly one per endpoint; replaced wholesale on key exchange.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionKey(String);

impl SessionKey {
    /// Generate a random alphanumeric key of the default length.
    pub fn generate() -> Self {
        Self::with_length(SESSION_KEY_LEN)
    }

    /// Generate a random alphanumeric key of `length` characters.
    pub fn with_length(length: usize) -> Self {
        let key: String = rand::rngs::OsRng
            .sample_iter(Alphanumeric)
            .take(length)
            .map(char::from)
            .collect();
        Self(key)
    }

    pub fn from_string(key: String) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the 32-byte cipher key from the passphrase (BLAKE3, with
    /// domain separation).
    fn cipher_key(&self) -> [u8; 32] {
        blake3::derive_key(KDF_CONTEXT_SESSION_KEY, self.0.as_bytes())
    }
}

// Keep the secret out of logs and panic messages.
impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionKey(len={})", self.0.len())
    }
}

fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt a text payload. Output is base64 of nonce || ciphertext, so the
/// same (plaintext, key) pair yields a different string on every call.
pub fn encrypt(plaintext: &str, key: &SessionKey) -> Result<String, CryptoError> {
    let key_bytes = key.cipher_key();
    let cipher = XChaCha20Poly1305::new((&key_bytes).into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(sealed))
}

/// Decrypt a payload produced by [`encrypt`]. Any encoding, authentication,
/// or UTF-8 failure maps to [`CryptoError::DecryptionFailed`]; a wrong key
/// degrades to an error, never a panic.
pub fn decrypt(sealed: &str, key: &SessionKey) -> Result<String, CryptoError> {
    let data = BASE64
        .decode(sealed)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let key_bytes = key.cipher_key();
    let cipher = XChaCha20Poly1305::new((&key_bytes).into());
    let nonce = XNonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = SessionKey::generate();
        let plaintext = "meet me at the quad at noon";

        let sealed = encrypt(plaintext, &key).unwrap();
        let opened = decrypt(&sealed, &key).unwrap();

        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = SessionKey::generate();
        let key2 = SessionKey::generate();

        let sealed = encrypt("secret message", &key1).unwrap();
        assert!(decrypt(&sealed, &key2).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = SessionKey::generate();
        let sealed = encrypt("important data", &key).unwrap();

        let mut raw = BASE64.decode(&sealed).unwrap();
        let len = raw.len();
        raw[len - 1] ^= 0xFF;
        let tampered = BASE64.encode(raw);

        assert!(decrypt(&tampered, &key).is_err());
    }

    #[test]
    fn test_garbage_input_fails() {
        let key = SessionKey::generate();
        assert!(decrypt("", &key).is_err());
        assert!(decrypt("not base64 at all!!", &key).is_err());
        // valid base64 but shorter than a nonce
        assert!(decrypt(&BASE64.encode(b"tiny"), &key).is_err());
    }

    #[test]
    fn test_ciphertext_randomized_per_call() {
        let key = SessionKey::generate();
        let a = encrypt("same input", &key).unwrap();
        let b = encrypt("same input", &key).unwrap();
        assert_ne!(a, b);
        assert_eq!(decrypt(&a, &key).unwrap(), decrypt(&b, &key).unwrap());
    }

    #[test]
    fn test_generated_key_shape() {
        let key = SessionKey::generate();
        assert_eq!(key.as_str().len(), SESSION_KEY_LEN);
        assert!(key.as_str().chars().all(|c| c.is_ascii_alphanumeric()));

        let short = SessionKey::with_length(8);
        assert_eq!(short.as_str().len(), 8);
    }

    #[test]
    fn test_unicode_roundtrip() {
        let key = SessionKey::generate();
        let plaintext = "café ☕ —見る";
        let sealed = encrypt(plaintext, &key).unwrap();
        assert_eq!(decrypt(&sealed, &key).unwrap(), plaintext);
    }
}
