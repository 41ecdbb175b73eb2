//! Audit Ledger
//!
//! Tamper-evident recording of security and patient-data-access events
//! with hash chains, keyed signatures, window checkpoints and Merkle
//! anchoring over ranges.

pub mod builder;
pub mod catalog;
pub mod chain;
pub mod entry;
pub mod journal;
pub mod ledger;
pub mod merkle;
pub mod query;
pub mod report;
pub mod store;
pub mod verify;

pub use builder::{EntryBuilder, LogRequest};
pub use catalog::{event_types, Category, EventCatalog, Severity};
pub use entry::{AuditEntry, DetailValue, Details, Outcome, SourceContext};
pub use journal::{load_journal_file, Journal};
pub use ledger::{Ledger, LogReceipt, Requester, RetentionNotice};
pub use merkle::{generate_proof, merkle_root, MerkleProof};
pub use query::{SearchCriteria, SearchResults};
pub use report::{ComplianceReport, ReportSection};
pub use verify::{Failure, FailureKind, IntegrityVerifier, VerificationResult};
