//! RSA string sealing for sending secrets to a key holder.
//!
//! Sealed format: `v{n}:{base64(ciphertext)}` where `n` selects the padding:
//! - `v0`: PKCS#1 v1.5
//! - `v1`: OAEP with SHA-256
//!
//! SECURITY: Error types never contain plaintext or key material.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;

/// Errors from sealing or unsealing a string.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid private key")]
    InvalidPrivateKey,

    #[error("unsupported encryption format: {0}")]
    UnsupportedFormat(String),

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("malformed sealed string")]
    Malformed,
}

/// Padding scheme used for a sealed string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionFormat {
    /// PKCS#1 v1.5 (legacy receivers).
    V0,
    /// OAEP with SHA-256.
    V1,
}

impl EncryptionFormat {
    fn version(self) -> u8 {
        match self {
            EncryptionFormat::V0 => 0,
            EncryptionFormat::V1 => 1,
        }
    }
}

impl fmt::Display for EncryptionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.version())
    }
}

impl FromStr for EncryptionFormat {
    type Err = SealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v0" | "0" => Ok(EncryptionFormat::V0),
            "v1" | "1" => Ok(EncryptionFormat::V1),
            other => Err(SealError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// An RSA public key parsed from SubjectPublicKeyInfo PEM.
#[derive(Debug, Clone)]
pub struct PublicKey {
    key: RsaPublicKey,
}

impl PublicKey {
    pub fn from_pem(pem: &str) -> Result<Self, SealError> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| SealError::InvalidPublicKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// Encrypt `text` and wrap it in the versioned sealed format.
    ///
    /// Padding is randomized, so sealing the same text twice gives
    /// different output.
    pub fn encrypt_string(&self, text: &str, format: EncryptionFormat) -> Result<String, SealError> {
        let mut rng = rand::thread_rng();
        let ciphertext = match format {
            EncryptionFormat::V0 => self.key.encrypt(&mut rng, Pkcs1v15Encrypt, text.as_bytes()),
            EncryptionFormat::V1 => {
                self.key
                    .encrypt(&mut rng, Oaep::new::<Sha256>(), text.as_bytes())
            }
        }
        .map_err(|_| SealError::EncryptionFailed)?;

        Ok(format!("{format}:{}", STANDARD.encode(ciphertext)))
    }
}

/// The receiving side's RSA private key.
///
/// Does not derive Debug.
pub struct PrivateKey {
    key: RsaPrivateKey,
}

impl PrivateKey {
    /// Parse a PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1
    /// (`BEGIN RSA PRIVATE KEY`) PEM.
    pub fn from_pem(pem: &str) -> Result<Self, SealError> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|_| SealError::InvalidPrivateKey)?;
        Ok(Self { key })
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: self.key.to_public_key(),
        }
    }

    /// Reverse [`PublicKey::encrypt_string`], choosing the padding from the
    /// version prefix.
    pub fn decrypt_string(&self, sealed: &str) -> Result<String, SealError> {
        let (version, payload) = sealed.split_once(':').ok_or(SealError::Malformed)?;
        let format: EncryptionFormat = version.parse()?;
        if !version.starts_with('v') {
            return Err(SealError::Malformed);
        }
        let ciphertext = STANDARD.decode(payload).map_err(|_| SealError::Malformed)?;

        let plaintext = match format {
            EncryptionFormat::V0 => self.key.decrypt(Pkcs1v15Encrypt, &ciphertext),
            EncryptionFormat::V1 => self.key.decrypt(Oaep::new::<Sha256>(), &ciphertext),
        }
        .map_err(|_| SealError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| SealError::DecryptionFailed)
    }
}
