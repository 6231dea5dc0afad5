//! Sealed-box encryption for GitHub Actions secrets.
//!
//! GitHub only accepts secret values encrypted with the repository's
//! Curve25519 public key using a libsodium sealed box:
//! - an ephemeral X25519 keypair per message
//! - XSalsa20-Poly1305 with a nonce derived from both public keys
//!
//! Ciphertexts are randomized, so encrypting the same value twice never
//! yields the same bytes.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use crypto_box::PublicKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const PUBLIC_KEY_LEN: usize = 32;

/// Encryption errors
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("Invalid base64 encoding in public key: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid public key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Sealing the secret value failed")]
    SealFailed,
}

/// Result type for encryption operations
pub type EncryptionResult<T> = Result<T, EncryptionError>;

/// A repository's Actions public key as returned by GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoPublicKey {
    pub key_id: String,
    /// Base64-encoded Curve25519 key
    pub key: String,
}

/// Encrypted secret, shaped as the body of the secret PUT request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub encrypted_value: String,
    pub key_id: String,
}

/// A parsed repository key, ready to seal any number of values.
#[derive(Debug, Clone)]
pub struct SealingKey {
    key_id: String,
    public: PublicKey,
}

impl SealingKey {
    /// Decode and validate a repository public key.
    pub fn parse(public_key: &RepoPublicKey) -> EncryptionResult<Self> {
        let bytes = BASE64.decode(public_key.key.trim())?;
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(EncryptionError::InvalidKeyLength(bytes.len()));
        }
        let mut arr = [0u8; PUBLIC_KEY_LEN];
        arr.copy_from_slice(&bytes);

        Ok(Self {
            key_id: public_key.key_id.clone(),
            public: PublicKey::from(arr),
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Seal a plaintext value for this repository.
    pub fn seal(&self, plaintext: &str) -> EncryptionResult<EncryptedSecret> {
        let ciphertext = self
            .public
            .seal(&mut OsRng, plaintext.as_bytes())
            .map_err(|_| EncryptionError::SealFailed)?;

        Ok(EncryptedSecret {
            encrypted_value: BASE64.encode(ciphertext),
            key_id: self.key_id.clone(),
        })
    }
}

/// Encrypt a plaintext with a repository public key in one step.
pub fn encrypt(public_key: &RepoPublicKey, plaintext: &str) -> EncryptionResult<EncryptedSecret> {
    SealingKey::parse(public_key)?.seal(plaintext)
}
