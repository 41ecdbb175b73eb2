//! Ledger write path and verification tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use audit_ledger::audit::catalog::{event_types, Category, Severity};
use audit_ledger::audit::entry::Outcome;
use audit_ledger::audit::{Ledger, LogRequest};
use audit_ledger::config::LedgerConfig;
use audit_ledger::crypto::{Aes256GcmSealer, FieldSealer, SealContext};
use audit_ledger::LedgerError;
use common::*;

#[tokio::test]
async fn test_log_event_returns_receipt() {
    let ledger = setup_test_ledger().await;

    let receipt = ledger
        .log_event(
            LogRequest::new(event_types::PATIENT_RECORD_VIEWED, "view")
                .actor("dr-lee")
                .subject("patient-001")
                .resource("patient_record", Some("rec-1")),
        )
        .await
        .unwrap();

    assert_eq!(receipt.chain_index, 1);
    let entry = ledger.get(&receipt.audit_id).await.unwrap();
    assert_eq!(entry.timestamp, receipt.timestamp);
    assert_eq!(entry.category, Category::PatientAccess);
    assert_eq!(entry.severity, Severity::Medium);
    assert_eq!(entry.outcome, Outcome::Success);
    assert_eq!(entry.resource_id.as_deref(), Some("rec-1"));
}

#[tokio::test]
async fn test_unknown_event_type_is_rejected() {
    let ledger = setup_test_ledger().await;
    let before = ledger.len().await;

    let result = ledger
        .log_event(LogRequest::new("teleport_patient", "beam").actor("dr-lee"))
        .await;

    assert!(matches!(result, Err(LedgerError::UnknownEventType(ref t)) if t == "teleport_patient"));
    assert_eq!(ledger.len().await, before);
}

#[tokio::test]
async fn test_sensitive_details_are_redacted() {
    let ledger = setup_test_ledger().await;

    let receipt = ledger
        .log_event(
            LogRequest::new(event_types::PASSWORD_CHANGED, "change")
                .actor("nurse-kim")
                .detail("new_password", "hunter2")
                .detail("note", "SSN 123-45-6789 on file"),
        )
        .await
        .unwrap();

    let entry = ledger.get(&receipt.audit_id).await.unwrap();
    let json = serde_json::to_string(&*entry).unwrap();
    assert!(!json.contains("hunter2"));
    assert!(!json.contains("123-45-6789"));
}

#[tokio::test]
async fn test_unrecognized_outcome_is_failure() {
    let ledger = setup_test_ledger().await;
    let receipt = ledger
        .log_event(LogRequest::new(event_types::LOGIN_FAILURE, "login").outcome("locked_out"))
        .await
        .unwrap();

    let entry = ledger.get(&receipt.audit_id).await.unwrap();
    assert_eq!(entry.outcome, Outcome::Failure);
    assert_eq!(entry.actor_id, "system");
}

#[tokio::test]
async fn test_chain_links_every_entry() {
    let ledger = setup_test_ledger().await;
    log_category_mix(&ledger).await;

    let entries = ledger.range(0, usize::MAX).await;
    assert_eq!(entries.len(), 6);
    assert_eq!(entries[0].chain.previous_hash, "0");
    for (i, pair) in entries.windows(2).enumerate() {
        assert_eq!(pair[1].chain.previous_hash, pair[0].chain.hash);
        assert_eq!(pair[1].chain.index, i + 1);
        assert!(pair[1].timestamp >= pair[0].timestamp);
    }
}

#[tokio::test]
async fn test_untampered_ledger_verifies() {
    let ledger = setup_test_ledger().await;
    log_category_mix(&ledger).await;

    let full = ledger.verify_all().await.unwrap();
    assert!(full.verified);
    assert_eq!(full.verified_count, 6);

    for (a, b) in [(0, 0), (1, 3), (2, 5), (5, 5)] {
        let result = ledger.verify(a, b).await.unwrap();
        assert!(result.verified, "range [{}, {}] should verify", a, b);
        assert_eq!(result.verified_count, b - a + 1);
    }
}

#[tokio::test]
async fn test_correction_references_existing_entry() {
    let ledger = setup_test_ledger().await;
    let original = ledger
        .log_event(LogRequest::new(event_types::PATIENT_RECORD_UPDATED, "update").actor("dr-lee"))
        .await
        .unwrap();

    let correction = ledger
        .log_event(
            LogRequest::new(event_types::AUDIT_ENTRY_CORRECTED, "correct")
                .actor("compliance-officer")
                .corrects(&original.audit_id)
                .detail("reason", "wrong record id"),
        )
        .await
        .unwrap();

    let entry = ledger.get(&correction.audit_id).await.unwrap();
    assert_eq!(entry.corrects.as_deref(), Some(original.audit_id.as_str()));
    assert!(ledger.get(&original.audit_id).await.is_some());

    let missing = ledger
        .log_event(
            LogRequest::new(event_types::AUDIT_ENTRY_CORRECTED, "correct").corrects("no-such-entry"),
        )
        .await;
    assert!(matches!(missing, Err(LedgerError::UnknownEntry(_))));
}

#[tokio::test]
async fn test_sealing_failure_rejects_event() {
    let ledger = Ledger::open(LedgerConfig::default(), test_key(), Arc::new(FailingSealer))
        .await
        .unwrap();

    let result = ledger
        .log_event(
            LogRequest::new(event_types::PATIENT_RECORD_VIEWED, "view")
                .actor("dr-lee")
                .subject("patient-001"),
        )
        .await;

    assert!(matches!(result, Err(LedgerError::SealingFailed(_))));
    assert_eq!(ledger.len().await, 1);

    // Events without a subject never touch the sealer.
    ledger
        .log_event(LogRequest::new(event_types::LOGOUT, "logout").actor("dr-lee"))
        .await
        .unwrap();
    assert_eq!(ledger.len().await, 2);
}

#[tokio::test]
async fn test_sealing_timeout_rejects_event() {
    let config = LedgerConfig {
        seal_timeout_ms: 50,
        ..Default::default()
    };
    let sealer = SlowSealer {
        delay: Duration::from_millis(300),
        inner: Aes256GcmSealer::new(&[9u8; 32]).unwrap(),
    };
    let ledger = Ledger::open(config, test_key(), Arc::new(sealer)).await.unwrap();

    let result = ledger
        .log_event(
            LogRequest::new(event_types::PATIENT_RECORD_VIEWED, "view")
                .actor("dr-lee")
                .subject("patient-001"),
        )
        .await;

    assert!(matches!(result, Err(LedgerError::SealTimeout(50))));
    assert_eq!(ledger.len().await, 1);
}

#[tokio::test]
async fn test_sealed_subject_opens_with_sealer() {
    let ledger = setup_test_ledger().await;
    let receipt = ledger
        .log_event(
            LogRequest::new(event_types::IMAGING_STUDY_VIEWED, "view")
                .actor("radiologist-9")
                .subject("patient-777"),
        )
        .await
        .unwrap();

    let entry = ledger.get(&receipt.audit_id).await.unwrap();
    let sealed = entry.subject.as_ref().unwrap();
    let opened = test_sealer()
        .unseal(sealed, &SealContext::new(&entry.id, "subject"))
        .unwrap();
    assert_eq!(opened, b"patient-777");
}

#[tokio::test]
async fn test_concurrent_appends_are_serialized() {
    let ledger = Arc::new(setup_test_ledger().await);

    let mut handles = Vec::new();
    for worker in 0..8 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            let mut indices = Vec::new();
            for n in 0..10 {
                let receipt = ledger
                    .log_event(
                        LogRequest::new(event_types::PATIENT_RECORD_VIEWED, "view")
                            .actor(&format!("worker-{}", worker))
                            .subject(&format!("patient-{}", n)),
                    )
                    .await
                    .unwrap();
                indices.push(receipt.chain_index);
            }
            indices
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    all.sort_unstable();
    assert_eq!(all, (1..=80).collect::<Vec<_>>());

    let entries = ledger.range(0, usize::MAX).await;
    let mut previous: Vec<&str> = entries.iter().map(|e| e.chain.previous_hash.as_str()).collect();
    previous.sort_unstable();
    previous.dedup();
    assert_eq!(previous.len(), entries.len());

    assert!(ledger.verify_all().await.unwrap().verified);
}
