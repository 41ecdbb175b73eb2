//! Entry Builder
//!
//! Turns a caller's event description into an unlinked `AuditEntry`:
//! validates the event type against the catalog, derives category,
//! severity and retention, normalises the outcome and redacts sensitive
//! content in `details`. Redaction is irreversible and happens before
//! hashing, so the redacted form is what the chain protects.

use chrono::Utc;
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::audit::catalog::EventCatalog;
use crate::audit::entry::{
    AuditEntry, ChainData, DetailValue, Details, Outcome, SourceContext, SYSTEM_ACTOR,
};
use crate::error::{LedgerError, Result};

pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Key fragments that mark a detail as sensitive. Keys are compared after
/// lowercasing and stripping `_`, `-`, `.` and spaces.
pub const SENSITIVE_KEY_FRAGMENTS: &[&str] = &[
    "password",
    "passwd",
    "passphrase",
    "token",
    "secret",
    "ssn",
    "socialsecurity",
    "apikey",
    "authorization",
    "credential",
    "privatekey",
    "creditcard",
    "cardnumber",
    "cvv",
];

/// Caller-supplied description of an event to log.
#[derive(Debug, Clone, Default)]
pub struct LogRequest {
    pub event_type: String,
    pub actor_id: Option<String>,
    pub subject_id: Option<String>,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub action: String,
    pub outcome: String,
    pub details: Details,
    pub source: SourceContext,
    pub corrects: Option<String>,
}

impl LogRequest {
    pub fn new(event_type: &str, action: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            action: action.to_string(),
            outcome: Outcome::Success.as_str().to_string(),
            ..Default::default()
        }
    }

    pub fn actor(mut self, actor_id: &str) -> Self {
        self.actor_id = Some(actor_id.to_string());
        self
    }

    pub fn subject(mut self, subject_id: &str) -> Self {
        self.subject_id = Some(subject_id.to_string());
        self
    }

    pub fn resource(mut self, resource_type: &str, resource_id: Option<&str>) -> Self {
        self.resource_type = resource_type.to_string();
        self.resource_id = resource_id.map(str::to_string);
        self
    }

    pub fn outcome(mut self, outcome: &str) -> Self {
        self.outcome = outcome.to_string();
        self
    }

    pub fn detail(mut self, key: &str, value: impl Into<DetailValue>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn details(mut self, details: Details) -> Self {
        self.details = details;
        self
    }

    pub fn source(mut self, source: SourceContext) -> Self {
        self.source = source;
        self
    }

    pub fn corrects(mut self, entry_id: &str) -> Self {
        self.corrects = Some(entry_id.to_string());
        self
    }
}

/// An entry that passed validation but is not yet sealed, linked or signed.
#[derive(Debug, Clone)]
pub struct DraftEntry {
    pub entry: AuditEntry,
    /// Cleartext subject id, to be sealed before linking. Never persisted.
    pub subject_plaintext: Option<String>,
}

pub struct EntryBuilder<'a> {
    catalog: &'a EventCatalog,
}

impl<'a> EntryBuilder<'a> {
    pub fn new(catalog: &'a EventCatalog) -> Self {
        Self { catalog }
    }

    pub fn build(&self, request: LogRequest) -> Result<DraftEntry> {
        let meta = self.catalog.lookup(&request.event_type)?;

        let actor_id = request
            .actor_id
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| SYSTEM_ACTOR.to_string());

        let subject_plaintext = request
            .subject_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if let Some(corrects) = &request.corrects {
            if corrects.trim().is_empty() {
                return Err(LedgerError::UnknownEntry("empty correction reference".to_string()));
            }
        }

        let entry = AuditEntry {
            id: Uuid::new_v4().to_string(),
            event_type: request.event_type,
            category: meta.category,
            severity: meta.severity,
            retention_days: meta.retention_days,
            timestamp: Utc::now(),
            actor_id,
            subject: None,
            subject_ref: None,
            resource_type: request.resource_type,
            resource_id: request.resource_id,
            action: request.action,
            outcome: Outcome::normalize(&request.outcome),
            details: sanitize_details(request.details),
            source: request.source,
            corrects: request.corrects,
            chain: ChainData::default(),
            signature: String::new(),
        };

        Ok(DraftEntry {
            entry,
            subject_plaintext,
        })
    }
}

/// Lowercase words of a detail key, split on separators and camelCase humps.
fn key_words(key: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in key.chars() {
        if matches!(c, '_' | '-' | '.' | ' ') {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// A key is sensitive when some run of consecutive words spells a fragment,
/// so `api_key` and `userPassword` match but `business_name` does not.
pub fn is_sensitive_key(key: &str) -> bool {
    let words = key_words(key);
    (0..words.len()).any(|start| {
        let mut run = String::new();
        words[start..].iter().any(|word| {
            run.push_str(word);
            let singular = run.strip_suffix('s').unwrap_or(&run);
            SENSITIVE_KEY_FRAGMENTS
                .iter()
                .any(|fragment| run == *fragment || singular == *fragment)
        })
    })
}

fn ssn_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("SSN pattern is valid")
    })
}

fn bearer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9\-._~+/]+=*")
            .expect("bearer pattern is valid")
    })
}

fn scrub_text(text: String) -> String {
    let text = ssn_pattern().replace_all(&text, REDACTION_MARKER);
    bearer_pattern().replace_all(&text, REDACTION_MARKER).into_owned()
}

fn sanitize_value(value: DetailValue) -> DetailValue {
    match value {
        DetailValue::Text(text) => DetailValue::Text(scrub_text(text)),
        DetailValue::Number(n) if !n.is_finite() => DetailValue::Text(n.to_string()),
        DetailValue::Map(map) => DetailValue::Map(sanitize_details(map)),
        other => other,
    }
}

/// Redact sensitive keys at every nesting level and scrub identifiers
/// embedded in free text.
pub fn sanitize_details(details: Details) -> Details {
    details
        .into_iter()
        .map(|(key, value)| {
            let value = if is_sensitive_key(&key) {
                DetailValue::Text(REDACTION_MARKER.to_string())
            } else {
                sanitize_value(value)
            };
            (key, value)
        })
        .collect()
}
