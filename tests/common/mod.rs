#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use audit_ledger::audit::catalog::event_types;
use audit_ledger::audit::{Ledger, LogReceipt, LogRequest};
use audit_ledger::config::{JournalConfig, LedgerConfig};
use audit_ledger::crypto::{Aes256GcmSealer, FieldSealer, SealContext, SealedField, SigningKey};
use audit_ledger::{LedgerError, Result};

/// Fixed signing key so a ledger can be reopened and re-verified.
pub fn test_key() -> SigningKey {
    SigningKey::from_bytes([7u8; 32])
}

pub fn test_sealer() -> Arc<dyn FieldSealer> {
    Arc::new(Aes256GcmSealer::new(&[9u8; 32]).expect("Failed to create sealer"))
}

/// Setup an in-memory ledger for testing
pub async fn setup_test_ledger() -> Ledger {
    Ledger::open(LedgerConfig::default(), test_key(), test_sealer())
        .await
        .expect("Failed to open ledger")
}

pub fn file_config(path: &Path) -> LedgerConfig {
    LedgerConfig {
        journal: JournalConfig::File {
            path: path.to_path_buf(),
        },
        ..Default::default()
    }
}

pub async fn open_file_ledger(path: &Path) -> Result<Ledger> {
    Ledger::open(file_config(path), test_key(), test_sealer()).await
}

/// Log the five-entry mix: auth, auth, patient_access, security, patient_access.
pub async fn log_category_mix(ledger: &Ledger) -> Vec<LogReceipt> {
    let requests = vec![
        LogRequest::new(event_types::LOGIN_SUCCESS, "login").actor("dr-lee"),
        LogRequest::new(event_types::LOGIN_FAILURE, "login")
            .actor("nurse-kim")
            .outcome("denied"),
        LogRequest::new(event_types::PATIENT_RECORD_VIEWED, "view")
            .actor("dr-lee")
            .subject("patient-001")
            .resource("patient_record", Some("rec-1")),
        LogRequest::new(event_types::SUSPICIOUS_ACTIVITY, "flag")
            .actor("ids")
            .detail("reason", "burst of exports"),
        LogRequest::new(event_types::PATIENT_RECORD_UPDATED, "update")
            .actor("nurse-kim")
            .subject("patient-002")
            .resource("patient_record", Some("rec-2")),
    ];

    let mut receipts = Vec::new();
    for request in requests {
        receipts.push(ledger.log_event(request).await.expect("Failed to log event"));
    }
    receipts
}

/// Sealer that always fails, standing in for an unavailable key service.
pub struct FailingSealer;

impl FieldSealer for FailingSealer {
    fn seal(&self, _plaintext: &[u8], _context: &SealContext) -> Result<SealedField> {
        Err(LedgerError::SealingFailed("key service unavailable".to_string()))
    }

    fn unseal(&self, _envelope: &SealedField, _context: &SealContext) -> Result<Vec<u8>> {
        Err(LedgerError::SealingFailed("key service unavailable".to_string()))
    }
}

/// Sealer that blocks before delegating, for timeout tests.
pub struct SlowSealer {
    pub delay: Duration,
    pub inner: Aes256GcmSealer,
}

impl FieldSealer for SlowSealer {
    fn seal(&self, plaintext: &[u8], context: &SealContext) -> Result<SealedField> {
        std::thread::sleep(self.delay);
        self.inner.seal(plaintext, context)
    }

    fn unseal(&self, envelope: &SealedField, context: &SealContext) -> Result<Vec<u8>> {
        self.inner.unseal(envelope, context)
    }
}
