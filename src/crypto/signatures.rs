use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::audit::entry::AuditEntry;
use crate::crypto::key_management::SigningKey;

type HmacSha256 = Hmac<Sha256>;

/// Produces and checks HMAC-SHA256 tags over entries, and derives the
/// keyed subject index.
#[derive(Clone)]
pub struct EntrySigner {
    key: SigningKey,
}

impl EntrySigner {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn key_fingerprint(&self) -> String {
        self.key.fingerprint()
    }

    fn mac(&self) -> HmacSha256 {
        <HmacSha256 as Mac>::new_from_slice(self.key.as_bytes())
            .expect("HMAC accepts keys of any length")
    }

    /// Tag over `{id, timestamp, hash, previous_hash}`.
    pub fn sign(&self, entry: &AuditEntry) -> String {
        let mut mac = self.mac();
        mac.update(entry.signing_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time comparison of the stored tag with a recomputation.
    pub fn verify_signature(&self, entry: &AuditEntry) -> bool {
        let Ok(tag) = hex::decode(&entry.signature) else {
            return false;
        };
        let mut mac = self.mac();
        mac.update(entry.signing_string().as_bytes());
        mac.verify_slice(&tag).is_ok()
    }

    /// Keyed digest of a subject identifier, so equality search works
    /// without storing or decrypting the cleartext.
    pub fn subject_index(&self, subject_id: &str) -> String {
        let mut mac = self.mac();
        mac.update(b"subject:");
        mac.update(subject_id.as_bytes());
        format!("hmac:{}", hex::encode(mac.finalize().into_bytes()))
    }
}
