//! Query engine and compliance reporter tests

mod common;

use chrono::{Duration, Utc};

use audit_ledger::audit::catalog::{event_types, Category, Severity};
use audit_ledger::audit::entry::Outcome;
use audit_ledger::audit::{LogRequest, ReportSection, Requester, SearchCriteria};
use audit_ledger::LedgerError;
use common::*;

fn auditor() -> Requester {
    Requester::new("auditor-1")
}

#[tokio::test]
async fn test_empty_criteria_returns_all_newest_first() {
    let ledger = setup_test_ledger().await;
    log_category_mix(&ledger).await;

    let results = ledger.search(&SearchCriteria::new(), &auditor()).await.unwrap();

    // Genesis is excluded; the search's own access entry is written afterwards.
    assert_eq!(results.total, 5);
    assert!(!results.has_more);
    for pair in results.entries.windows(2) {
        assert!(
            pair[0].timestamp > pair[1].timestamp
                || (pair[0].timestamp == pair[1].timestamp && pair[0].chain.index > pair[1].chain.index)
        );
    }
}

#[tokio::test]
async fn test_search_records_access() {
    let ledger = setup_test_ledger().await;
    log_category_mix(&ledger).await;
    let before = ledger.len().await;

    ledger
        .search(&SearchCriteria::new().category(Category::Security), &auditor())
        .await
        .unwrap();

    assert_eq!(ledger.len().await, before + 1);
    let access = ledger.range(before, before).await;
    assert_eq!(access[0].event_type, event_types::AUDIT_LOG_ACCESSED);
    assert_eq!(access[0].severity, Severity::Low);
    assert_eq!(access[0].actor_id, "auditor-1");
}

#[tokio::test]
async fn test_filters_are_conjunctive() {
    let ledger = setup_test_ledger().await;
    log_category_mix(&ledger).await;

    let criteria = SearchCriteria::new()
        .category(Category::PatientAccess)
        .actor("dr-lee");
    let results = ledger.search(&criteria, &auditor()).await.unwrap();
    assert_eq!(results.total, 1);
    assert_eq!(results.entries[0].event_type, event_types::PATIENT_RECORD_VIEWED);

    let failures = ledger
        .search(&SearchCriteria::new().outcome(Outcome::Failure), &auditor())
        .await
        .unwrap();
    assert_eq!(failures.total, 1);
    assert_eq!(failures.entries[0].actor_id, "nurse-kim");
}

#[tokio::test]
async fn test_search_by_subject_uses_blind_index() {
    let ledger = setup_test_ledger().await;
    log_category_mix(&ledger).await;

    let results = ledger
        .search(&SearchCriteria::new().subject("patient-002"), &auditor())
        .await
        .unwrap();
    assert_eq!(results.total, 1);
    assert_eq!(results.entries[0].event_type, event_types::PATIENT_RECORD_UPDATED);
}

#[tokio::test]
async fn test_text_search_is_case_insensitive() {
    let ledger = setup_test_ledger().await;
    log_category_mix(&ledger).await;

    let results = ledger
        .search(&SearchCriteria::new().text("BURST OF EXPORTS"), &auditor())
        .await
        .unwrap();
    assert_eq!(results.total, 1);
    assert_eq!(results.entries[0].category, Category::Security);
}

#[tokio::test]
async fn test_pagination_covers_every_entry_once() {
    let ledger = setup_test_ledger().await;
    for n in 0..7 {
        ledger
            .log_event(LogRequest::new(event_types::MESSAGE_SENT, "send").detail("n", n as u32))
            .await
            .unwrap();
    }

    let base = SearchCriteria::new().event_type(event_types::MESSAGE_SENT);
    let full = ledger.search(&base, &auditor()).await.unwrap();
    assert_eq!(full.total, 7);

    let mut paged = Vec::new();
    let mut offset = 0;
    loop {
        let page = ledger
            .search(&base.clone().page(offset, 3), &auditor())
            .await
            .unwrap();
        assert_eq!(page.total, 7);
        paged.extend(page.entries.iter().map(|e| e.id.clone()));
        if !page.has_more {
            break;
        }
        offset += 3;
    }

    let expected: Vec<String> = full.entries.iter().map(|e| e.id.clone()).collect();
    assert_eq!(paged, expected);
}

#[tokio::test]
async fn test_report_counts_categories() {
    let ledger = setup_test_ledger().await;
    let start = Utc::now() - Duration::seconds(1);
    log_category_mix(&ledger).await;
    let end = Utc::now() + Duration::seconds(1);

    let report = ledger
        .generate_report(start, end, &ReportSection::ALL, &auditor())
        .await
        .unwrap();

    let summary = &report.summary;
    assert_eq!(summary.total_events, 5);
    assert_eq!(summary.events_by_category.len(), 3);
    assert_eq!(summary.events_by_category[&Category::Auth], 2);
    assert_eq!(summary.events_by_category[&Category::PatientAccess], 2);
    assert_eq!(summary.events_by_category[&Category::Security], 1);
    assert_eq!(summary.unique_actors, 3);
    assert_eq!(summary.unique_subjects, 2);
    assert_eq!(summary.security_events, 1);
    assert_eq!(summary.failed_authentications, 1);
    assert_eq!(summary.compliance_violations, 0);

    assert!(report.integrity.verified);
    assert!(report.verdict.compliant);
    assert!(report.patient_access.is_some());
    assert!(report.security.is_some());
}

#[tokio::test]
async fn test_report_records_generation() {
    let ledger = setup_test_ledger().await;
    log_category_mix(&ledger).await;
    let before = ledger.len().await;

    let report = ledger
        .generate_report(
            Utc::now() - Duration::days(1),
            Utc::now() + Duration::days(1),
            &[],
            &auditor(),
        )
        .await
        .unwrap();

    assert!(report.patient_access.is_none());
    let recorded = ledger.range(before, before).await;
    assert_eq!(recorded[0].event_type, event_types::COMPLIANCE_REPORT_GENERATED);
    assert_eq!(recorded[0].resource_id.as_deref(), Some(report.report_id.as_str()));
}

#[tokio::test]
async fn test_report_rejects_inverted_period() {
    let ledger = setup_test_ledger().await;
    let now = Utc::now();
    let result = ledger
        .generate_report(now, now - Duration::days(1), &ReportSection::ALL, &auditor())
        .await;
    assert!(matches!(result, Err(LedgerError::InvalidRange(_))));
}
