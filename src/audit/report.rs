//! Compliance Reporter
//!
//! Aggregates a time window of entries into summary statistics and a
//! verdict. A report is only compliant when the whole ledger passed
//! integrity verification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::catalog::{event_types, Category, Severity};
use crate::audit::entry::{AuditEntry, Outcome};
use crate::audit::verify::VerificationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSection {
    PatientAccess,
    Security,
    Administrative,
}

impl ReportSection {
    pub const ALL: [ReportSection; 3] = [
        ReportSection::PatientAccess,
        ReportSection::Security,
        ReportSection::Administrative,
    ];
}

impl std::str::FromStr for ReportSection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient_access" => Ok(ReportSection::PatientAccess),
            "security" => Ok(ReportSection::Security),
            "administrative" => Ok(ReportSection::Administrative),
            _ => Err(format!("Unknown report section: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_events: usize,
    pub events_by_category: BTreeMap<Category, usize>,
    pub events_by_severity: BTreeMap<Severity, usize>,
    pub unique_actors: usize,
    pub unique_subjects: usize,
    pub security_events: usize,
    pub failed_authentications: usize,
    pub compliance_violations: usize,
    pub entries_past_retention: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientAccessSection {
    pub total_accesses: usize,
    pub unique_patients: usize,
    pub by_event_type: BTreeMap<String, usize>,
    pub by_actor: BTreeMap<String, usize>,
    pub failed_accesses: usize,
    pub exports: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuritySection {
    pub total_events: usize,
    pub by_event_type: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub failed_logins_by_actor: BTreeMap<String, usize>,
    /// Ids of high and critical security events.
    pub escalations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdministrativeSection {
    pub total_actions: usize,
    pub by_event_type: BTreeMap<String, usize>,
    pub by_actor: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegritySummary {
    pub verified: bool,
    pub verified_count: usize,
    pub signature_failures: usize,
    pub chain_breaks: usize,
    pub sealed_field_issues: usize,
}

impl From<&VerificationResult> for IntegritySummary {
    fn from(result: &VerificationResult) -> Self {
        Self {
            verified: result.verified,
            verified_count: result.verified_count,
            signature_failures: result.signature_failures.len(),
            chain_breaks: result.chain_breaks.len(),
            sealed_field_issues: result.sealed_field_issues.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub compliant: bool,
    pub findings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub report_id: String,
    pub generated_at: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub summary: ReportSummary,
    pub patient_access: Option<PatientAccessSection>,
    pub security: Option<SecuritySection>,
    pub administrative: Option<AdministrativeSection>,
    pub integrity: IntegritySummary,
    pub verdict: ComplianceVerdict,
}

fn is_failed_authentication(entry: &AuditEntry) -> bool {
    entry.event_type == event_types::LOGIN_FAILURE
        || (entry.category == Category::Auth && entry.outcome == Outcome::Failure)
}

fn is_past_retention(entry: &AuditEntry, as_of: DateTime<Utc>) -> bool {
    entry.retention_ends_at().is_some_and(|due_at| due_at < as_of)
}

/// Build a report over the non-genesis entries timestamped in
/// `[start, end]`. `integrity` is the result of verifying the whole ledger.
pub fn build_report(
    entries: &[Arc<AuditEntry>],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    sections: &[ReportSection],
    integrity: &VerificationResult,
    as_of: DateTime<Utc>,
) -> ComplianceReport {
    let window: Vec<&AuditEntry> = entries
        .iter()
        .map(|e| &**e)
        .filter(|e| !e.is_genesis() && e.timestamp >= start && e.timestamp <= end)
        .collect();

    let mut summary = ReportSummary {
        total_events: window.len(),
        ..Default::default()
    };
    let mut actors = HashSet::new();
    let mut subjects = HashSet::new();

    for entry in &window {
        *summary.events_by_category.entry(entry.category).or_insert(0) += 1;
        *summary.events_by_severity.entry(entry.severity).or_insert(0) += 1;
        actors.insert(entry.actor_id.as_str());
        if let Some(subject_ref) = &entry.subject_ref {
            subjects.insert(subject_ref.as_str());
        }
        if entry.category == Category::Security {
            summary.security_events += 1;
        }
        if is_failed_authentication(entry) {
            summary.failed_authentications += 1;
        }
        if entry.event_type == event_types::COMPLIANCE_VIOLATION {
            summary.compliance_violations += 1;
        }
        if is_past_retention(entry, as_of) {
            summary.entries_past_retention += 1;
        }
    }
    summary.unique_actors = actors.len();
    summary.unique_subjects = subjects.len();

    let patient_access = sections
        .contains(&ReportSection::PatientAccess)
        .then(|| patient_access_section(&window));
    let security = sections
        .contains(&ReportSection::Security)
        .then(|| security_section(&window));
    let administrative = sections
        .contains(&ReportSection::Administrative)
        .then(|| administrative_section(&window));

    let integrity_summary = IntegritySummary::from(integrity);
    let verdict = compliance_verdict(&summary, &integrity_summary);

    ComplianceReport {
        report_id: Uuid::new_v4().to_string(),
        generated_at: as_of,
        period_start: start,
        period_end: end,
        summary,
        patient_access,
        security,
        administrative,
        integrity: integrity_summary,
        verdict,
    }
}

fn compliance_verdict(summary: &ReportSummary, integrity: &IntegritySummary) -> ComplianceVerdict {
    let mut findings = Vec::new();

    if !integrity.verified {
        findings.push(format!(
            "Ledger integrity verification failed: {} signature failures, {} chain breaks, {} sealed-field issues",
            integrity.signature_failures, integrity.chain_breaks, integrity.sealed_field_issues
        ));
    }
    if summary.compliance_violations > 0 {
        findings.push(format!(
            "{} compliance violations recorded in period",
            summary.compliance_violations
        ));
    }
    if summary.failed_authentications > 0 {
        findings.push(format!(
            "{} failed authentication attempts in period",
            summary.failed_authentications
        ));
    }
    if summary.entries_past_retention > 0 {
        findings.push(format!(
            "{} entries are past their retention period",
            summary.entries_past_retention
        ));
    }

    ComplianceVerdict {
        compliant: integrity.verified,
        findings,
    }
}

fn patient_access_section(window: &[&AuditEntry]) -> PatientAccessSection {
    let mut section = PatientAccessSection::default();
    let mut patients = HashSet::new();

    for entry in window.iter().filter(|e| e.category == Category::PatientAccess) {
        section.total_accesses += 1;
        *section.by_event_type.entry(entry.event_type.clone()).or_insert(0) += 1;
        *section.by_actor.entry(entry.actor_id.clone()).or_insert(0) += 1;
        if let Some(subject_ref) = &entry.subject_ref {
            patients.insert(subject_ref.as_str());
        }
        if entry.outcome == Outcome::Failure {
            section.failed_accesses += 1;
        }
        if entry.event_type == event_types::PATIENT_RECORD_EXPORTED {
            section.exports += 1;
        }
    }

    section.unique_patients = patients.len();
    section
}

fn security_section(window: &[&AuditEntry]) -> SecuritySection {
    let mut section = SecuritySection::default();

    for entry in window {
        if is_failed_authentication(entry) {
            *section
                .failed_logins_by_actor
                .entry(entry.actor_id.clone())
                .or_insert(0) += 1;
        }
        if entry.category != Category::Security {
            continue;
        }
        section.total_events += 1;
        *section.by_event_type.entry(entry.event_type.clone()).or_insert(0) += 1;
        *section.by_severity.entry(entry.severity).or_insert(0) += 1;
        if entry.severity >= Severity::High {
            section.escalations.push(entry.id.clone());
        }
    }

    section
}

fn administrative_section(window: &[&AuditEntry]) -> AdministrativeSection {
    let mut section = AdministrativeSection::default();

    for entry in window.iter().filter(|e| e.category == Category::Administrative) {
        section.total_actions += 1;
        *section.by_event_type.entry(entry.event_type.clone()).or_insert(0) += 1;
        *section.by_actor.entry(entry.actor_id.clone()).or_insert(0) += 1;
    }

    section
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::builder::{EntryBuilder, LogRequest};
    use chrono::Duration;
    use crate::audit::catalog::EventCatalog;
    use crate::audit::chain::ChainLinker;
    use crate::audit::store::LedgerStore;

    fn ledger_of(requests: Vec<LogRequest>) -> Vec<Arc<AuditEntry>> {
        let catalog = EventCatalog::builtin();
        let linker = ChainLinker::new(8).unwrap();
        let mut store = LedgerStore::new();
        let genesis = EntryBuilder::new(&catalog)
            .build(LogRequest::new(event_types::LEDGER_INITIALIZED, "initialize"))
            .unwrap()
            .entry;
        store.append(Arc::new(linker.link(genesis, &store).unwrap())).unwrap();

        for request in requests {
            let mut entry = EntryBuilder::new(&catalog).build(request).unwrap().entry;
            if entry.category == Category::PatientAccess {
                entry.subject_ref = Some(format!("hmac:{}", entry.actor_id));
            }
            store.append(Arc::new(linker.link(entry, &store).unwrap())).unwrap();
        }
        store.snapshot()
    }

    fn clean_integrity(count: usize) -> VerificationResult {
        let mut result = VerificationResult::new(0, count.saturating_sub(1));
        result.verified_count = count;
        result.verified = true;
        result
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (Utc::now() - Duration::hours(1), Utc::now() + Duration::hours(1))
    }

    #[test]
    fn test_category_breakdown() {
        let entries = ledger_of(vec![
            LogRequest::new(event_types::LOGIN_SUCCESS, "login").actor("alice"),
            LogRequest::new(event_types::LOGIN_FAILURE, "login").actor("bob").outcome("failure"),
            LogRequest::new(event_types::PATIENT_RECORD_VIEWED, "read").actor("alice"),
            LogRequest::new(event_types::SUSPICIOUS_ACTIVITY, "flag").actor("ids"),
            LogRequest::new(event_types::PATIENT_RECORD_UPDATED, "write").actor("carol"),
        ]);
        let (start, end) = window();
        let report = build_report(&entries, start, end, &[], &clean_integrity(6), Utc::now());

        assert_eq!(report.summary.total_events, 5);
        assert_eq!(report.summary.events_by_category.get(&Category::Auth), Some(&2));
        assert_eq!(report.summary.events_by_category.get(&Category::PatientAccess), Some(&2));
        assert_eq!(report.summary.events_by_category.get(&Category::Security), Some(&1));
        assert_eq!(report.summary.events_by_category.len(), 3);
        assert_eq!(report.summary.unique_actors, 4);
        assert_eq!(report.summary.unique_subjects, 2);
        assert_eq!(report.summary.security_events, 1);
        assert_eq!(report.summary.failed_authentications, 1);
        assert!(report.verdict.compliant);
        assert!(report.patient_access.is_none());
    }

    #[test]
    fn test_sections_on_request() {
        let entries = ledger_of(vec![
            LogRequest::new(event_types::PATIENT_RECORD_EXPORTED, "export").actor("dana"),
            LogRequest::new(event_types::DATA_BREACH_SUSPECTED, "flag").actor("ids"),
            LogRequest::new(event_types::USER_ROLE_CHANGED, "grant").actor("admin"),
            LogRequest::new(event_types::COMPLIANCE_VIOLATION, "record").actor("auditor"),
        ]);
        let (start, end) = window();
        let report = build_report(
            &entries,
            start,
            end,
            &ReportSection::ALL,
            &clean_integrity(5),
            Utc::now(),
        );

        let patient = report.patient_access.unwrap();
        assert_eq!(patient.total_accesses, 1);
        assert_eq!(patient.exports, 1);

        let security = report.security.unwrap();
        assert_eq!(security.total_events, 1);
        assert_eq!(security.escalations.len(), 1);

        let admin = report.administrative.unwrap();
        assert_eq!(admin.by_actor.get("admin"), Some(&1));

        assert_eq!(report.summary.compliance_violations, 1);
        assert!(report.verdict.findings.iter().any(|f| f.contains("compliance violations")));
    }

    #[test]
    fn test_integrity_failure_blocks_compliance() {
        let entries = ledger_of(vec![LogRequest::new(event_types::LOGOUT, "logout")]);
        let mut integrity = clean_integrity(2);
        integrity.verified = false;
        integrity.chain_breaks.push(crate::audit::verify::Failure {
            index: 1,
            entry_id: entries[1].id.clone(),
            kind: crate::audit::verify::FailureKind::ChainBreak,
            detail: "forged".to_string(),
        });

        let (start, end) = window();
        let report = build_report(&entries, start, end, &[], &integrity, Utc::now());
        assert!(!report.verdict.compliant);
        assert_eq!(report.integrity.chain_breaks, 1);
    }

    #[test]
    fn test_period_excludes_outside_entries() {
        let entries = ledger_of(vec![LogRequest::new(event_types::LOGOUT, "logout")]);
        let start = Utc::now() + Duration::days(1);
        let end = start + Duration::days(1);
        let report = build_report(&entries, start, end, &[], &clean_integrity(2), Utc::now());
        assert_eq!(report.summary.total_events, 0);
    }

    #[test]
    fn test_retention_counted() {
        let entries = ledger_of(vec![LogRequest::new(event_types::LOGOUT, "logout")]);
        let (start, end) = window();
        let far_future = Utc::now() + Duration::days(4000);
        let report = build_report(&entries, start, end, &[], &clean_integrity(2), far_future);
        assert_eq!(report.summary.entries_past_retention, 1);
    }
}
