//! Signing Key Management
//!
//! Loads, generates and persists the process-wide ledger signing key.
//! Rotation and escrow are the operator's concern; losing the key means
//! historical signatures can no longer be re-verified.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{LedgerError, Result};

pub const SIGNING_KEY_LEN: usize = 32;

#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey([u8; SIGNING_KEY_LEN]);

impl SigningKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; SIGNING_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SIGNING_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(encoded: &str) -> Result<Self> {
        let decoded = hex::decode(encoded.trim())
            .map_err(|e| LedgerError::Crypto(format!("Invalid signing key hex: {}", e)))?;
        let bytes: [u8; SIGNING_KEY_LEN] = decoded.try_into().map_err(|v: Vec<u8>| {
            LedgerError::Crypto(format!(
                "Signing key must be {} bytes, got {}",
                SIGNING_KEY_LEN,
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Short public identifier of the key, safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..8])
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            LedgerError::Crypto(format!("Failed to read signing key {:?}: {}", path, e))
        })?;
        Self::from_hex(&contents)
    }

    /// Write the key as hex, owner-readable only on unix.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_hex())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Load the key at `path`, or generate and persist one if it is absent.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            let key = Self::load(path)?;
            info!("Loaded signing key {} from {:?}", key.fingerprint(), path);
            return Ok(key);
        }

        let key = Self::generate();
        key.save(path)?;
        warn!(
            "Generated new signing key {} at {:?}; back it up to keep historical signatures verifiable",
            key.fingerprint(),
            path
        );
        Ok(key)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey({})", self.fingerprint())
    }
}
