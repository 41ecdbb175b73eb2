//! Query Engine
//!
//! Conjunctive filtering over entries, newest first, with offset/limit
//! pagination. An empty criterion places no constraint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::audit::catalog::{Category, Severity};
use crate::audit::entry::{AuditEntry, Outcome};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub event_types: Vec<String>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub severities: Vec<Severity>,
    #[serde(default)]
    pub actor_ids: Vec<String>,
    /// Cleartext subject ids; matched through the keyed subject index.
    #[serde(default)]
    pub subject_ids: Vec<String>,
    #[serde(default)]
    pub resource_types: Vec<String>,
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
    /// Case-insensitive substring over event type, actor, action and details.
    pub text: Option<String>,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn event_type(mut self, event_type: &str) -> Self {
        self.event_types.push(event_type.to_string());
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.categories.push(category);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severities.push(severity);
        self
    }

    pub fn actor(mut self, actor_id: &str) -> Self {
        self.actor_ids.push(actor_id.to_string());
        self
    }

    pub fn subject(mut self, subject_id: &str) -> Self {
        self.subject_ids.push(subject_id.to_string());
        self
    }

    pub fn resource_type(mut self, resource_type: &str) -> Self {
        self.resource_types.push(resource_type.to_string());
        self
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcomes.push(outcome);
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Filter summary recorded in the access entry; never includes subject ids.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.from.is_some() || self.to.is_some() {
            parts.push("date_range".to_string());
        }
        for (name, len) in [
            ("event_types", self.event_types.len()),
            ("categories", self.categories.len()),
            ("severities", self.severities.len()),
            ("actor_ids", self.actor_ids.len()),
            ("subject_ids", self.subject_ids.len()),
            ("resource_types", self.resource_types.len()),
            ("outcomes", self.outcomes.len()),
        ] {
            if len > 0 {
                parts.push(format!("{}={}", name, len));
            }
        }
        if self.text.is_some() {
            parts.push("text".to_string());
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(",")
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub entries: Vec<AuditEntry>,
    /// Filtered count before pagination.
    pub total: usize,
    pub offset: usize,
    pub limit: Option<usize>,
    pub has_more: bool,
}

/// Criteria prepared for matching. Subject ids arrive already converted to
/// keyed subject indices.
pub struct QueryEngine {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    event_types: HashSet<String>,
    categories: HashSet<Category>,
    severities: HashSet<Severity>,
    actor_ids: HashSet<String>,
    subject_refs: HashSet<String>,
    resource_types: HashSet<String>,
    outcomes: HashSet<Outcome>,
    text: Option<String>,
    offset: usize,
    limit: Option<usize>,
    include_genesis: bool,
}

impl QueryEngine {
    pub fn new(criteria: &SearchCriteria, subject_refs: Vec<String>, include_genesis: bool) -> Self {
        Self {
            from: criteria.from,
            to: criteria.to,
            event_types: criteria.event_types.iter().cloned().collect(),
            categories: criteria.categories.iter().copied().collect(),
            severities: criteria.severities.iter().copied().collect(),
            actor_ids: criteria.actor_ids.iter().cloned().collect(),
            subject_refs: subject_refs.into_iter().collect(),
            resource_types: criteria.resource_types.iter().cloned().collect(),
            outcomes: criteria.outcomes.iter().copied().collect(),
            text: criteria
                .text
                .as_ref()
                .map(|t| t.to_lowercase())
                .filter(|t| !t.is_empty()),
            offset: criteria.offset,
            limit: criteria.limit,
            include_genesis,
        }
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if !self.include_genesis && entry.is_genesis() {
            return false;
        }
        if self.from.is_some_and(|from| entry.timestamp < from) {
            return false;
        }
        if self.to.is_some_and(|to| entry.timestamp > to) {
            return false;
        }
        if !self.event_types.is_empty() && !self.event_types.contains(&entry.event_type) {
            return false;
        }
        if !self.categories.is_empty() && !self.categories.contains(&entry.category) {
            return false;
        }
        if !self.severities.is_empty() && !self.severities.contains(&entry.severity) {
            return false;
        }
        if !self.actor_ids.is_empty() && !self.actor_ids.contains(&entry.actor_id) {
            return false;
        }
        if !self.subject_refs.is_empty() {
            match &entry.subject_ref {
                Some(subject_ref) if self.subject_refs.contains(subject_ref) => {}
                _ => return false,
            }
        }
        if !self.resource_types.is_empty() && !self.resource_types.contains(&entry.resource_type) {
            return false;
        }
        if !self.outcomes.is_empty() && !self.outcomes.contains(&entry.outcome) {
            return false;
        }
        if let Some(text) = &self.text {
            if !entry.search_text().to_lowercase().contains(text.as_str()) {
                return false;
            }
        }
        true
    }

    pub fn run(&self, entries: &[Arc<AuditEntry>]) -> SearchResults {
        self.paginate(self.select(entries))
    }

    /// Matching entries of `entries`, in ledger order.
    pub fn select<'a>(&self, entries: &'a [Arc<AuditEntry>]) -> Vec<&'a Arc<AuditEntry>> {
        entries.iter().filter(|e| self.matches(e)).collect()
    }

    /// Order matches newest first and cut the requested page.
    pub fn paginate(&self, mut matched: Vec<&Arc<AuditEntry>>) -> SearchResults {
        matched.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.chain.index.cmp(&a.chain.index))
        });

        let total = matched.len();
        let page: Vec<AuditEntry> = matched
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .map(|e| (**e).clone())
            .collect();
        let has_more = self.offset.saturating_add(page.len()) < total;

        SearchResults {
            entries: page,
            total,
            offset: self.offset,
            limit: self.limit,
            has_more,
        }
    }
}
