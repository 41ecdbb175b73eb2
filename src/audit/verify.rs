//! Integrity Verifier
//!
//! Walks a span of the ledger re-deriving content hashes, signatures, chain
//! links and window checkpoints. Findings are itemized, never raised as
//! errors. `verified` is true iff every failure list is empty.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::entry::{AuditEntry, GENESIS_PREVIOUS_HASH};
use crate::audit::merkle::window_checkpoint;
use crate::crypto::signatures::EntrySigner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SignatureInvalid,
    ContentHashMismatch,
    ChainBreak,
    IndexMismatch,
    GenesisMismatch,
    TimestampRegression,
    CheckpointMismatch,
    SealedFieldMalformed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub index: usize,
    pub entry_id: String,
    pub kind: FailureKind,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub start_index: usize,
    pub end_index: usize,
    /// Entries examined.
    pub verified_count: usize,
    pub signature_failures: Vec<Failure>,
    pub chain_breaks: Vec<Failure>,
    pub sealed_field_issues: Vec<Failure>,
}

impl VerificationResult {
    pub fn new(start_index: usize, end_index: usize) -> Self {
        Self {
            verified: false,
            start_index,
            end_index,
            verified_count: 0,
            signature_failures: Vec::new(),
            chain_breaks: Vec::new(),
            sealed_field_issues: Vec::new(),
        }
    }

    pub fn failure_count(&self) -> usize {
        self.signature_failures.len() + self.chain_breaks.len() + self.sealed_field_issues.len()
    }

    /// Every index with at least one finding, ascending.
    pub fn failing_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .signature_failures
            .iter()
            .chain(&self.chain_breaks)
            .chain(&self.sealed_field_issues)
            .map(|f| f.index)
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    pub fn failures_by_kind(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for failure in self
            .signature_failures
            .iter()
            .chain(&self.chain_breaks)
            .chain(&self.sealed_field_issues)
        {
            *counts.entry(failure.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Close the result and log the outcome.
    pub fn finish(&mut self) {
        self.verified = self.failure_count() == 0;
        if self.verified {
            info!(
                "Ledger verification successful: {} entries [{}, {}]",
                self.verified_count, self.start_index, self.end_index
            );
        } else {
            warn!(
                "Ledger verification found {} issues in [{}, {}]: {:?}",
                self.failure_count(),
                self.start_index,
                self.end_index,
                self.failures_by_kind()
            );
        }
    }

    pub fn summary(&self) -> String {
        if self.verified {
            format!(
                "✅ Ledger is intact ({} entries, [{}, {}])",
                self.verified_count, self.start_index, self.end_index
            )
        } else {
            format!(
                "❌ Ledger integrity failures ({} entries, [{}, {}]): {} signature, {} chain, {} sealed-field",
                self.verified_count,
                self.start_index,
                self.end_index,
                self.signature_failures.len(),
                self.chain_breaks.len(),
                self.sealed_field_issues.len()
            )
        }
    }
}

pub struct IntegrityVerifier<'a> {
    signer: &'a EntrySigner,
    window: usize,
}

impl<'a> IntegrityVerifier<'a> {
    pub fn new(signer: &'a EntrySigner, window: usize) -> Self {
        Self {
            signer,
            window: window.max(1),
        }
    }

    /// Verify `entries[start..=end]`. `entries` must be the ledger from
    /// position 0 so predecessors and checkpoint windows are available.
    pub fn verify(&self, entries: &[Arc<AuditEntry>], start: usize, end: usize) -> VerificationResult {
        let mut result = VerificationResult::new(start, end);
        let end = end.min(entries.len().saturating_sub(1));
        if !entries.is_empty() && start <= end {
            for index in start..=end {
                self.check_entry(entries, index, &mut result);
            }
        }
        result.finish();
        result
    }

    /// Run every check for the entry at `index`, recording findings.
    pub fn check_entry(&self, entries: &[Arc<AuditEntry>], index: usize, result: &mut VerificationResult) {
        let entry = &entries[index];
        let failure = |kind: FailureKind, detail: String| Failure {
            index,
            entry_id: entry.id.clone(),
            kind,
            detail,
        };

        // Content and signature
        match entry.calculate_hash() {
            Ok(hash) if hash == entry.chain.hash => {}
            Ok(hash) => result.signature_failures.push(failure(
                FailureKind::ContentHashMismatch,
                format!("stored hash {} but content hashes to {}", entry.chain.hash, hash),
            )),
            Err(e) => result.signature_failures.push(failure(
                FailureKind::ContentHashMismatch,
                format!("content could not be hashed: {}", e),
            )),
        }
        if !self.signer.verify_signature(entry) {
            result.signature_failures.push(failure(
                FailureKind::SignatureInvalid,
                "signature does not match {id, timestamp, hash, previous_hash}".to_string(),
            ));
        }

        // Position and linkage
        if entry.chain.index != index {
            result.chain_breaks.push(failure(
                FailureKind::IndexMismatch,
                format!("entry claims index {} at position {}", entry.chain.index, index),
            ));
        }
        if index == 0 {
            if entry.chain.previous_hash != GENESIS_PREVIOUS_HASH {
                result.chain_breaks.push(failure(
                    FailureKind::GenesisMismatch,
                    format!("genesis previous_hash is {}", entry.chain.previous_hash),
                ));
            }
        } else {
            let prev = &entries[index - 1];
            if entry.chain.previous_hash != prev.chain.hash {
                result.chain_breaks.push(failure(
                    FailureKind::ChainBreak,
                    format!(
                        "expected previous_hash {}, got {}",
                        prev.chain.hash, entry.chain.previous_hash
                    ),
                ));
            }
            if entry.timestamp < prev.timestamp {
                result.chain_breaks.push(failure(
                    FailureKind::TimestampRegression,
                    format!("{} precedes {}", entry.timestamp, prev.timestamp),
                ));
            }
        }

        let window_start = (index + 1).saturating_sub(self.window);
        let window: Vec<&str> = entries[window_start..=index]
            .iter()
            .map(|e| e.chain.hash.as_str())
            .collect();
        let checkpoint = window_checkpoint(&window);
        if checkpoint != entry.chain.merkle_root {
            result.chain_breaks.push(failure(
                FailureKind::CheckpointMismatch,
                format!("expected checkpoint {}, got {}", checkpoint, entry.chain.merkle_root),
            ));
        }

        // Sealed fields
        if let Some(subject) = &entry.subject {
            if let Err(e) = subject.payload() {
                result
                    .sealed_field_issues
                    .push(failure(FailureKind::SealedFieldMalformed, format!("subject: {}", e)));
            }
            if entry.subject_ref.is_none() {
                result.sealed_field_issues.push(failure(
                    FailureKind::SealedFieldMalformed,
                    "sealed subject has no subject_ref".to_string(),
                ));
            }
        }

        result.verified_count += 1;
    }
}

/// Indices whose content no longer matches their stored hash.
pub fn find_tampered_entries(entries: &[Arc<AuditEntry>]) -> Vec<usize> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| !entry.verify_hash())
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::builder::{EntryBuilder, LogRequest};
    use crate::audit::catalog::{event_types, EventCatalog};
    use crate::audit::chain::ChainLinker;
    use crate::audit::store::LedgerStore;
    use crate::crypto::key_management::SigningKey;
    use crate::crypto::sealing::SealedField;

    fn build_chain(count: usize, signer: &EntrySigner) -> Vec<Arc<AuditEntry>> {
        let catalog = EventCatalog::builtin();
        let linker = ChainLinker::new(4).unwrap();
        let mut store = LedgerStore::new();

        for i in 0..count {
            let mut entry = EntryBuilder::new(&catalog)
                .build(
                    LogRequest::new(event_types::PATIENT_RECORD_VIEWED, "read")
                        .actor(&format!("user-{}", i))
                        .detail("seq", i as u32),
                )
                .unwrap()
                .entry;
            if i % 2 == 0 {
                entry.subject = Some(SealedField::from_parts("aes256gcm", b"sealed-bytes"));
                entry.subject_ref = Some(signer.subject_index("patient"));
            }
            let mut linked = linker.link(entry, &store).unwrap();
            linked.signature = signer.sign(&linked);
            store.append(Arc::new(linked)).unwrap();
        }
        store.snapshot()
    }

    fn tamper<F: FnOnce(&mut AuditEntry)>(entries: &mut [Arc<AuditEntry>], index: usize, f: F) {
        let mut entry = (*entries[index]).clone();
        f(&mut entry);
        entries[index] = Arc::new(entry);
    }

    #[test]
    fn test_untampered_chain_verifies() {
        let signer = EntrySigner::new(SigningKey::generate());
        let entries = build_chain(10, &signer);
        let verifier = IntegrityVerifier::new(&signer, 4);

        let result = verifier.verify(&entries, 0, 9);
        assert!(result.verified, "{:?}", result);
        assert_eq!(result.verified_count, 10);

        let partial = verifier.verify(&entries, 3, 6);
        assert!(partial.verified);
        assert_eq!(partial.verified_count, 4);
    }

    #[test]
    fn test_actor_change_detected_at_index() {
        let signer = EntrySigner::new(SigningKey::generate());
        let mut entries = build_chain(6, &signer);
        tamper(&mut entries, 3, |e| e.actor_id = "mallory".to_string());

        let result = IntegrityVerifier::new(&signer, 4).verify(&entries, 0, 5);
        assert!(!result.verified);
        assert!(result
            .signature_failures
            .iter()
            .any(|f| f.index == 3 && f.kind == FailureKind::ContentHashMismatch));
    }

    #[test]
    fn test_rehashed_entry_breaks_signature_and_successor() {
        let signer = EntrySigner::new(SigningKey::generate());
        let mut entries = build_chain(6, &signer);
        tamper(&mut entries, 2, |e| {
            e.action = "delete".to_string();
            e.chain.hash = e.calculate_hash().unwrap();
        });

        let result = IntegrityVerifier::new(&signer, 4).verify(&entries, 0, 5);
        assert!(result
            .signature_failures
            .iter()
            .any(|f| f.index == 2 && f.kind == FailureKind::SignatureInvalid));
        assert!(result
            .chain_breaks
            .iter()
            .any(|f| f.index == 3 && f.kind == FailureKind::ChainBreak));
    }

    #[test]
    fn test_reordering_detected() {
        let signer = EntrySigner::new(SigningKey::generate());
        let mut entries = build_chain(6, &signer);
        entries.swap(2, 3);

        let result = IntegrityVerifier::new(&signer, 4).verify(&entries, 0, 5);
        assert!(!result.verified);
        assert!(result
            .chain_breaks
            .iter()
            .any(|f| f.kind == FailureKind::IndexMismatch));
    }

    #[test]
    fn test_malformed_envelope_reported() {
        let signer = EntrySigner::new(SigningKey::generate());
        let mut entries = build_chain(4, &signer);
        tamper(&mut entries, 2, |e| {
            e.subject = Some(SealedField::from_envelope("garbage".to_string()));
        });

        let result = IntegrityVerifier::new(&signer, 4).verify(&entries, 0, 3);
        assert!(result
            .sealed_field_issues
            .iter()
            .any(|f| f.index == 2 && f.kind == FailureKind::SealedFieldMalformed));
        assert_eq!(result.failing_indices(), vec![2]);
    }

    #[test]
    fn test_checkpoint_tamper_detected() {
        let signer = EntrySigner::new(SigningKey::generate());
        let mut entries = build_chain(4, &signer);
        tamper(&mut entries, 1, |e| e.chain.merkle_root = "sha256:forged".to_string());

        let result = IntegrityVerifier::new(&signer, 4).verify(&entries, 0, 3);
        assert!(result
            .chain_breaks
            .iter()
            .any(|f| f.index == 1 && f.kind == FailureKind::CheckpointMismatch));
    }

    #[test]
    fn test_find_tampered_entries() {
        let signer = EntrySigner::new(SigningKey::generate());
        let mut entries = build_chain(3, &signer);
        tamper(&mut entries, 1, |e| e.chain.hash = "sha256:tampered".to_string());

        assert_eq!(find_tampered_entries(&entries), vec![1]);
    }
}
