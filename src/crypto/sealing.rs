//! Sealed fields
//!
//! The ledger never stores a subject identifier in cleartext. It hands the
//! plaintext to a `FieldSealer` supplied by the host application and keeps
//! only the returned envelope. Envelopes have the textual form
//! `<scheme>:<base64 payload>`, which lets integrity verification check
//! their structure without holding any decryption key.
//!
//! `Aes256GcmSealer` is a reference sealer: AES-256-GCM with a random nonce,
//! the seal context bound as associated data.
//! Payload layout: `[nonce:12][ciphertext][tag:16]`.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LedgerError, Result};

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Encrypted envelope of a sensitive field.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedField(String);

impl SealedField {
    pub fn from_parts(scheme: &str, payload: &[u8]) -> Self {
        Self(format!("{}:{}", scheme, STANDARD.encode(payload)))
    }

    /// Wrap an envelope produced elsewhere, without validation.
    pub fn from_envelope(envelope: String) -> Self {
        Self(envelope)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> Option<&str> {
        self.0.split_once(':').map(|(scheme, _)| scheme)
    }

    /// Decode the payload bytes, checking the envelope structure.
    pub fn payload(&self) -> Result<Vec<u8>> {
        let (scheme, encoded) = self
            .0
            .split_once(':')
            .ok_or_else(|| LedgerError::Crypto("Envelope has no scheme separator".to_string()))?;

        let scheme_ok = !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if !scheme_ok {
            return Err(LedgerError::Crypto(format!("Invalid envelope scheme: {:?}", scheme)));
        }

        let payload = STANDARD
            .decode(encoded)
            .map_err(|e| LedgerError::Crypto(format!("Envelope payload is not base64: {}", e)))?;
        if payload.is_empty() {
            return Err(LedgerError::Crypto("Envelope payload is empty".to_string()));
        }
        Ok(payload)
    }

    pub fn is_well_formed(&self) -> bool {
        self.payload().is_ok()
    }
}

impl fmt::Debug for SealedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealedField({}, {} bytes)", self.scheme().unwrap_or("?"), self.0.len())
    }
}

/// Binds an envelope to the entry and field it was sealed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealContext {
    pub entry_id: String,
    pub field: String,
}

impl SealContext {
    pub fn new(entry_id: &str, field: &str) -> Self {
        Self {
            entry_id: entry_id.to_string(),
            field: field.to_string(),
        }
    }

    fn associated_data(&self) -> Vec<u8> {
        format!("{}|{}", self.entry_id, self.field).into_bytes()
    }
}

/// Encryption capability supplied by the host application.
pub trait FieldSealer: Send + Sync {
    fn seal(&self, plaintext: &[u8], context: &SealContext) -> Result<SealedField>;

    fn unseal(&self, envelope: &SealedField, context: &SealContext) -> Result<Vec<u8>>;
}

pub struct Aes256GcmSealer {
    cipher: Aes256Gcm,
}

impl Aes256GcmSealer {
    pub const SCHEME: &'static str = "aes256gcm";

    pub fn new(key: &[u8; 32]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| LedgerError::Crypto(format!("Invalid sealing key: {}", e)))?;
        Ok(Self { cipher })
    }

    pub fn from_hex(encoded: &str) -> Result<Self> {
        let decoded = hex::decode(encoded.trim())
            .map_err(|e| LedgerError::Crypto(format!("Invalid sealing key hex: {}", e)))?;
        let key: [u8; 32] = decoded
            .try_into()
            .map_err(|_| LedgerError::Crypto("Sealing key must be 32 bytes".to_string()))?;
        Self::new(&key)
    }

    /// Sealer with a throwaway random key.
    pub fn ephemeral() -> Result<Self> {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::new(&key)
    }
}

impl FieldSealer for Aes256GcmSealer {
    fn seal(&self, plaintext: &[u8], context: &SealContext) -> Result<SealedField> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let aad = context.associated_data();
        let ciphertext = self
            .cipher
            .encrypt(nonce, Payload { msg: plaintext, aad: &aad })
            .map_err(|e| LedgerError::SealingFailed(e.to_string()))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);

        Ok(SealedField::from_parts(Self::SCHEME, &payload))
    }

    fn unseal(&self, envelope: &SealedField, context: &SealContext) -> Result<Vec<u8>> {
        if envelope.scheme() != Some(Self::SCHEME) {
            return Err(LedgerError::Crypto(format!(
                "Unsupported envelope scheme: {:?}",
                envelope.scheme()
            )));
        }

        let payload = envelope.payload()?;
        if payload.len() < NONCE_LEN + TAG_LEN {
            return Err(LedgerError::Crypto(format!(
                "Envelope too short: {} bytes (minimum {})",
                payload.len(),
                NONCE_LEN + TAG_LEN
            )));
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let aad = context.associated_data();
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload { msg: ciphertext, aad: &aad },
            )
            .map_err(|_| LedgerError::Crypto("Envelope authentication failed".to_string()))
    }
}
