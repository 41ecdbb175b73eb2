//! Audit Ledger
//!
//! The single write path and the read entry points. Appends are serialized
//! by the writer lock: build, seal, link, sign, journal, then publish to the
//! store. Readers take `Arc` snapshots of the store and never observe a
//! partially linked entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::audit::builder::{EntryBuilder, LogRequest};
use crate::audit::catalog::{event_types, EventCatalog};
use crate::audit::chain::ChainLinker;
use crate::audit::entry::{AuditEntry, SourceContext, SYSTEM_ACTOR};
use crate::audit::journal::Journal;
use crate::audit::merkle::{self, MerkleProof};
use crate::audit::query::{QueryEngine, SearchCriteria, SearchResults};
use crate::audit::report::{build_report, ComplianceReport, ReportSection};
use crate::audit::store::LedgerStore;
use crate::audit::verify::{IntegrityVerifier, VerificationResult};
use crate::config::loader::load_catalog;
use crate::config::LedgerConfig;
use crate::crypto::key_management::SigningKey;
use crate::crypto::sealing::{Aes256GcmSealer, FieldSealer, SealContext, SealedField};
use crate::crypto::signatures::EntrySigner;
use crate::error::{LedgerError, Result};

/// Entries examined between cooperative yields during verification and search.
const SCAN_CHUNK: usize = 256;

/// Returned by a successful `log_event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogReceipt {
    pub audit_id: String,
    pub timestamp: DateTime<Utc>,
    pub chain_index: usize,
}

/// Who is reading the ledger. Recorded on the access entries that searches
/// and reports emit.
#[derive(Debug, Clone, Default)]
pub struct Requester {
    pub actor_id: String,
    pub source: SourceContext,
}

impl Requester {
    pub fn new(actor_id: &str) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            source: SourceContext::default(),
        }
    }

    pub fn with_source(mut self, source: SourceContext) -> Self {
        self.source = source;
        self
    }

    fn request(&self, event_type: &str, action: &str) -> LogRequest {
        LogRequest::new(event_type, action)
            .actor(&self.actor_id)
            .source(self.source.clone())
    }
}

/// An entry whose retention period has elapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionNotice {
    pub entry_id: String,
    pub index: usize,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub retention_days: u32,
    pub due_at: DateTime<Utc>,
}

struct Writer {
    journal: Journal,
    halted: bool,
}

pub struct Ledger {
    config: LedgerConfig,
    catalog: EventCatalog,
    signer: EntrySigner,
    sealer: Arc<dyn FieldSealer>,
    linker: ChainLinker,
    store: RwLock<LedgerStore>,
    writer: Mutex<Writer>,
}

impl Ledger {
    /// Open the configured journal, replay it, and write a genesis entry if
    /// it is empty.
    pub async fn open(
        config: LedgerConfig,
        key: SigningKey,
        sealer: Arc<dyn FieldSealer>,
    ) -> Result<Self> {
        config.validate()?;

        let catalog = match &config.catalog_path {
            Some(path) => load_catalog(path)?,
            None => EventCatalog::builtin(),
        };
        let linker = ChainLinker::new(config.merkle_window)?;
        let journal = Journal::open(&config.journal).await?;

        let recovered = journal.load().await?;
        let store = if recovered.is_empty() {
            LedgerStore::new()
        } else {
            LedgerStore::from_entries(recovered)?
        };
        if let Some(first) = store.at(0) {
            if !first.is_genesis() {
                return Err(LedgerError::Recovery(format!(
                    "journal does not start with a genesis entry (found {})",
                    first.event_type
                )));
            }
        }

        info!(
            "Opening ledger {} on {} journal (catalog {}, key {})",
            config.ledger_name,
            journal.describe(),
            catalog.version,
            key.fingerprint()
        );

        let ledger = Self {
            catalog,
            signer: EntrySigner::new(key),
            sealer,
            linker,
            store: RwLock::new(store),
            writer: Mutex::new(Writer {
                journal,
                halted: false,
            }),
            config,
        };

        let len = ledger.len().await;
        if len == 0 {
            ledger.write_genesis().await?;
        } else {
            info!("Recovered {} entries, head {}", len, ledger.head_hash().await.unwrap_or_default());
        }

        Ok(ledger)
    }

    /// Open with keys taken from the configured key files, or ephemeral
    /// keys when none are configured.
    pub async fn from_config(config: LedgerConfig) -> Result<Self> {
        let key = match &config.signing_key_path {
            Some(path) => SigningKey::load_or_generate(path)?,
            None => {
                warn!("No signing key configured; signatures will not verify after restart");
                SigningKey::generate()
            }
        };
        let sealer = match &config.sealing_key_path {
            Some(path) => Aes256GcmSealer::from_hex(&SigningKey::load_or_generate(path)?.to_hex())?,
            None => {
                warn!("No sealing key configured; sealed subjects will not be recoverable");
                Aes256GcmSealer::ephemeral()?
            }
        };
        Self::open(config, key, Arc::new(sealer)).await
    }

    /// Process-lifetime ledger with random keys.
    pub async fn in_memory() -> Result<Self> {
        Self::open(
            LedgerConfig::default(),
            SigningKey::generate(),
            Arc::new(Aes256GcmSealer::ephemeral()?),
        )
        .await
    }

    async fn write_genesis(&self) -> Result<()> {
        let request = LogRequest::new(event_types::LEDGER_INITIALIZED, "initialize")
            .actor(SYSTEM_ACTOR)
            .resource("ledger", Some(self.config.ledger_name.as_str()))
            .detail("catalog_version", self.catalog.version.as_str())
            .detail("key_fingerprint", self.signer.key_fingerprint());
        let draft = EntryBuilder::new(&self.catalog).build(request)?;
        let receipt = self.append(draft.entry).await?;
        info!("Ledger {} initialized with genesis {}", self.config.ledger_name, receipt.audit_id);
        Ok(())
    }

    /// Record an event. The sole write entry point.
    pub async fn log_event(&self, request: LogRequest) -> Result<LogReceipt> {
        let draft = EntryBuilder::new(&self.catalog).build(request)?;
        let mut entry = draft.entry;

        if let Some(target) = &entry.corrects {
            if !self.store.read().await.contains(target) {
                return Err(LedgerError::UnknownEntry(target.clone()));
            }
        }

        if let Some(subject) = draft.subject_plaintext {
            entry.subject_ref = Some(self.signer.subject_index(&subject));
            entry.subject = Some(self.seal_subject(&entry.id, subject).await?);
        }

        self.append(entry).await
    }

    async fn seal_subject(&self, entry_id: &str, subject: String) -> Result<SealedField> {
        let sealer = Arc::clone(&self.sealer);
        let context = SealContext::new(entry_id, "subject");
        let task = tokio::task::spawn_blocking(move || sealer.seal(subject.as_bytes(), &context));

        let sealed = match tokio::time::timeout(self.config.seal_timeout(), task).await {
            Ok(Ok(Ok(sealed))) => sealed,
            Ok(Ok(Err(LedgerError::SealingFailed(msg)))) => return Err(LedgerError::SealingFailed(msg)),
            Ok(Ok(Err(e))) => return Err(LedgerError::SealingFailed(e.to_string())),
            Ok(Err(e)) => {
                return Err(LedgerError::SealingFailed(format!("sealing task failed: {}", e)))
            }
            Err(_) => {
                warn!("Sealing subject for {} timed out", entry_id);
                return Err(LedgerError::SealTimeout(self.config.seal_timeout_ms));
            }
        };

        if !sealed.is_well_formed() {
            return Err(LedgerError::SealingFailed(
                "sealer returned a malformed envelope".to_string(),
            ));
        }
        Ok(sealed)
    }

    /// Link, sign, journal and publish. Nothing is visible to readers until
    /// the journal write has succeeded.
    async fn append(&self, entry: AuditEntry) -> Result<LogReceipt> {
        let mut writer = self.writer.lock().await;
        if writer.halted {
            return Err(LedgerError::LedgerHalted);
        }

        let mut linked = {
            let store = self.store.read().await;
            self.linker.link(entry, &store)?
        };
        linked.signature = self.signer.sign(&linked);

        if let Err(e) = writer.journal.append(&linked).await {
            if e.is_fatal() {
                writer.halted = true;
                error!("Journal write failed at index {}; halting ledger: {}", linked.chain.index, e);
            }
            return Err(e);
        }

        let receipt = LogReceipt {
            audit_id: linked.id.clone(),
            timestamp: linked.timestamp,
            chain_index: linked.chain.index,
        };

        if let Err(e) = self.store.write().await.append(Arc::new(linked)) {
            writer.halted = true;
            error!("Store rejected index {}; halting ledger: {}", receipt.chain_index, e);
            return Err(e);
        }

        debug!("Appended {} at index {}", receipt.audit_id, receipt.chain_index);
        Ok(receipt)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<AuditEntry>> {
        self.store.read().await.get(id).cloned()
    }

    /// Entries at positions `start..=end`, clamped to the ledger.
    pub async fn range(&self, start: usize, end: usize) -> Vec<Arc<AuditEntry>> {
        self.store
            .read()
            .await
            .range(start, end.saturating_add(1))
            .to_vec()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    pub async fn head_hash(&self) -> Option<String> {
        self.store.read().await.last().map(|e| e.chain.hash.clone())
    }

    pub async fn is_halted(&self) -> bool {
        self.writer.lock().await.halted
    }

    pub async fn snapshot(&self) -> Vec<Arc<AuditEntry>> {
        self.store.read().await.snapshot()
    }

    pub fn catalog(&self) -> &EventCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn signer(&self) -> &EntrySigner {
        &self.signer
    }

    /// Search the ledger under the configured search timeout. The search
    /// itself is recorded as an `audit_log_accessed` entry, written after the
    /// results are computed; a timed-out search is not recorded.
    pub async fn search(&self, criteria: &SearchCriteria, requester: &Requester) -> Result<SearchResults> {
        let subject_refs = criteria
            .subject_ids
            .iter()
            .map(|s| self.signer.subject_index(s.trim()))
            .collect();
        let engine = QueryEngine::new(criteria, subject_refs, self.config.include_genesis_in_search);

        let work = async {
            let snapshot = self.snapshot().await;
            let mut matched = Vec::new();
            for chunk in snapshot.chunks(SCAN_CHUNK) {
                matched.extend(engine.select(chunk));
                tokio::task::yield_now().await;
            }
            engine.paginate(matched)
        };
        let results = tokio::time::timeout(self.config.search_timeout(), work)
            .await
            .map_err(|_| LedgerError::Timeout(self.config.search_timeout_ms))?;

        let access = requester
            .request(event_types::AUDIT_LOG_ACCESSED, "search")
            .resource("audit_ledger", Some(self.config.ledger_name.as_str()))
            .detail("criteria", criteria.describe())
            .detail("total", results.total as i64)
            .detail("returned", results.entries.len() as i64);
        self.log_event(access).await?;

        Ok(results)
    }

    /// Verify positions `start..=end`. `end` is clamped to the tail.
    pub async fn verify(&self, start: usize, end: usize) -> Result<VerificationResult> {
        let snapshot = self.snapshot().await;
        if start > end || start >= snapshot.len() {
            return Err(LedgerError::invalid_range(start, end, snapshot.len()));
        }
        let end = end.min(snapshot.len() - 1);
        self.verify_snapshot(&snapshot, start, end).await
    }

    pub async fn verify_all(&self) -> Result<VerificationResult> {
        let snapshot = self.snapshot().await;
        self.verify_snapshot(&snapshot, 0, snapshot.len().saturating_sub(1)).await
    }

    async fn verify_snapshot(
        &self,
        entries: &[Arc<AuditEntry>],
        start: usize,
        end: usize,
    ) -> Result<VerificationResult> {
        let verifier = IntegrityVerifier::new(&self.signer, self.linker.window());
        let work = async {
            let mut result = VerificationResult::new(start, end);
            let mut index = start;
            while !entries.is_empty() && index <= end {
                let chunk_end = (index + SCAN_CHUNK - 1).min(end);
                for i in index..=chunk_end {
                    verifier.check_entry(entries, i, &mut result);
                }
                index = chunk_end + 1;
                tokio::task::yield_now().await;
            }
            result.finish();
            result
        };

        tokio::time::timeout(self.config.verify_timeout(), work)
            .await
            .map_err(|_| LedgerError::Timeout(self.config.verify_timeout_secs.saturating_mul(1000)))
    }

    /// Report over `[start, end]`. The whole ledger is verified for the
    /// verdict, and the report is recorded as a
    /// `compliance_report_generated` entry.
    pub async fn generate_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sections: &[ReportSection],
        requester: &Requester,
    ) -> Result<ComplianceReport> {
        if start > end {
            return Err(LedgerError::InvalidRange(format!(
                "report period starts {} after it ends {}",
                start, end
            )));
        }

        let snapshot = self.snapshot().await;
        let integrity = self
            .verify_snapshot(&snapshot, 0, snapshot.len().saturating_sub(1))
            .await?;
        let report = build_report(&snapshot, start, end, sections, &integrity, Utc::now());

        let record = requester
            .request(event_types::COMPLIANCE_REPORT_GENERATED, "generate_report")
            .resource("compliance_report", Some(report.report_id.as_str()))
            .detail("period_start", start.to_rfc3339())
            .detail("period_end", end.to_rfc3339())
            .detail("total_events", report.summary.total_events as i64)
            .detail("compliant", report.verdict.compliant);
        self.log_event(record).await?;

        info!(
            "Generated compliance report {} ({} events, compliant: {})",
            report.report_id, report.summary.total_events, report.verdict.compliant
        );
        Ok(report)
    }

    async fn range_hashes(&self, start: usize, end: usize) -> Result<Vec<String>> {
        let store = self.store.read().await;
        if start > end || end >= store.len() {
            return Err(LedgerError::invalid_range(start, end, store.len()));
        }
        Ok(store
            .range(start, end + 1)
            .iter()
            .map(|e| e.chain.hash.clone())
            .collect())
    }

    /// Merkle root over the entry hashes at positions `start..=end`.
    pub async fn merkle_root(&self, start: usize, end: usize) -> Result<String> {
        let hashes = self.range_hashes(start, end).await?;
        merkle::merkle_root(&hashes)
    }

    /// Inclusion proof for the entry at `index` within `start..=end`.
    pub async fn merkle_proof(&self, index: usize, start: usize, end: usize) -> Result<MerkleProof> {
        if index < start || index > end {
            return Err(LedgerError::InvalidRange(format!(
                "index {} is outside [{}, {}]",
                index, start, end
            )));
        }
        let hashes = self.range_hashes(start, end).await?;
        merkle::generate_proof(&hashes, index - start)
    }

    /// Entries whose retention period ended before `as_of`. Nothing is
    /// removed; disposal is an operator decision.
    pub async fn retention_due(&self, as_of: DateTime<Utc>) -> Vec<RetentionNotice> {
        self.snapshot()
            .await
            .iter()
            .filter_map(|entry| {
                let due_at = entry.retention_ends_at()?;
                (due_at < as_of).then(|| RetentionNotice {
                    entry_id: entry.id.clone(),
                    index: entry.chain.index,
                    event_type: entry.event_type.clone(),
                    timestamp: entry.timestamp,
                    retention_days: entry.retention_days,
                    due_at,
                })
            })
            .collect()
    }
}
