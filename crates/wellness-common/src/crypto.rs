//! Client-side encryption envelope.
//!
//! Check-ins and journal entries are encrypted on the device with a key
//! derived from the user's passphrase and a per-user salt. The server only
//! ever sees the envelope string and validates its shape with
//! [`Envelope::parse`].

use aes_gcm::{aead::{Aead, KeyInit}, Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

pub const ENVELOPE_PREFIX: &str = "wc1.";
pub const PBKDF2_ITERATIONS: u32 = 10_000;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope must start with {ENVELOPE_PREFIX}")]
    MissingPrefix,
    #[error("envelope body is not valid base64")]
    Encoding,
    #[error("envelope is too short")]
    Truncated,
    #[error("salt must be {SALT_LEN} hex-encoded bytes")]
    InvalidSalt,
    #[error("decryption failed")]
    Decrypt,
    #[error("encryption failed")]
    Encrypt,
    #[error("payload is not valid JSON: {0}")]
    Payload(String),
}

/// Generates a fresh hex-encoded salt for a new user.
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    hex::encode(salt)
}

/// Derives the AES-256 key for `password` under a hex salt from [`generate_salt`].
pub fn derive_key(password: &str, salt_hex: &str) -> Result<EncryptionKey, EnvelopeError> {
    let salt = hex::decode(salt_hex).map_err(|_| EnvelopeError::InvalidSalt)?;
    if salt.len() != SALT_LEN {
        return Err(EnvelopeError::InvalidSalt);
    }
    let mut bytes = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut bytes);
    Ok(EncryptionKey { bytes })
}

/// A parsed `wc1.` envelope: nonce followed by ciphertext with its GCM tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl Envelope {
    pub fn parse(s: &str) -> Result<Self, EnvelopeError> {
        let body = s.strip_prefix(ENVELOPE_PREFIX).ok_or(EnvelopeError::MissingPrefix)?;
        let raw = STANDARD.decode(body.trim()).map_err(|_| EnvelopeError::Encoding)?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(EnvelopeError::Truncated);
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&raw[..NONCE_LEN]);
        Ok(Self { nonce, ciphertext: raw[NONCE_LEN..].to_vec() })
    }

    /// Shape check only. No key is needed.
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        raw.extend_from_slice(&self.nonce);
        raw.extend_from_slice(&self.ciphertext);
        format!("{}{}", ENVELOPE_PREFIX, STANDARD.encode(raw))
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

pub struct EncryptionKey {
    bytes: [u8; KEY_LEN],
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey").field("bytes", &"<redacted>").finish()
    }
}

impl EncryptionKey {
    fn cipher(&self) -> Result<Aes256Gcm, EnvelopeError> {
        Aes256Gcm::new_from_slice(&self.bytes).map_err(|_| EnvelopeError::Encrypt)
    }

    pub fn encrypt_json<T: Serialize>(&self, value: &T) -> Result<Envelope, EnvelopeError> {
        let plaintext = serde_json::to_vec(value).map_err(|e| EnvelopeError::Payload(e.to_string()))?;
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_ref())
            .map_err(|_| EnvelopeError::Encrypt)?;
        Ok(Envelope { nonce, ciphertext })
    }

    pub fn decrypt_json<T: DeserializeOwned>(&self, envelope: &Envelope) -> Result<T, EnvelopeError> {
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(&envelope.nonce), envelope.ciphertext.as_ref())
            .map_err(|_| EnvelopeError::Decrypt)?;
        serde_json::from_slice(&plaintext).map_err(|e| EnvelopeError::Payload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encrypt_then_decrypt_with_same_password() {
        let salt = generate_salt();
        let key = derive_key("correct horse", &salt).unwrap();
        let payload = json!({"mood": 7, "voiceNote": "slept well"});

        let envelope = key.encrypt_json(&payload).unwrap();
        let wire = envelope.encode();
        assert!(wire.starts_with(ENVELOPE_PREFIX));

        // A second device derives the same key from the stored salt.
        let other_device = derive_key("correct horse", &salt).unwrap();
        let parsed = Envelope::parse(&wire).unwrap();
        let back: serde_json::Value = other_device.decrypt_json(&parsed).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_wrong_password_fails() {
        let salt = generate_salt();
        let key = derive_key("one", &salt).unwrap();
        let envelope = key.encrypt_json(&json!({"a": 1})).unwrap();

        let wrong = derive_key("two", &salt).unwrap();
        let result: Result<serde_json::Value, _> = wrong.decrypt_json(&envelope);
        assert_eq!(result.unwrap_err(), EnvelopeError::Decrypt);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let salt = generate_salt();
        let key = derive_key("pw", &salt).unwrap();
        let mut envelope = key.encrypt_json(&json!("secret")).unwrap();
        envelope.ciphertext[0] ^= 0x01;
        let result: Result<String, _> = key.decrypt_json(&envelope);
        assert_eq!(result.unwrap_err(), EnvelopeError::Decrypt);
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let key = derive_key("pw", &generate_salt()).unwrap();
        let a = key.encrypt_json(&json!("same")).unwrap().encode();
        let b = key.encrypt_json(&json!("same")).unwrap().encode();
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_rejects_malformed_envelopes() {
        assert_eq!(Envelope::parse("plain text").unwrap_err(), EnvelopeError::MissingPrefix);
        assert_eq!(Envelope::parse("wc1.***").unwrap_err(), EnvelopeError::Encoding);
        assert_eq!(Envelope::parse("wc1.AAAA").unwrap_err(), EnvelopeError::Truncated);
        assert!(!Envelope::is_valid(""));
    }

    #[test]
    fn test_salt_shape() {
        let salt = generate_salt();
        assert_eq!(salt.len(), SALT_LEN * 2);
        assert_ne!(salt, generate_salt());
        assert_eq!(derive_key("pw", "abc").unwrap_err(), EnvelopeError::InvalidSalt);
        assert_eq!(derive_key("pw", "00ff").unwrap_err(), EnvelopeError::InvalidSalt);
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = derive_key("pw", &generate_salt()).unwrap();
        let shown = format!("{:?}", key);
        assert!(shown.contains("redacted"));
        assert!(!shown.contains('['));
    }
}
