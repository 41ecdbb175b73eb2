//! Audit Entry
//!
//! Defines the atomic, immutable unit of the ledger together with its chain
//! data. Once `signature` is set an entry is never edited; corrections are
//! new entries that reference the original through `corrects`.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::audit::catalog::{Category, Severity};
use crate::crypto::sealing::SealedField;
use crate::error::Result;

/// `previous_hash` of the genesis entry.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Actor recorded when the caller does not attribute the event.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    /// Map a caller-supplied outcome onto the closed enumeration.
    /// Anything unrecognised is a failure.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "success" | "succeeded" | "ok" => Outcome::Success,
            _ => Outcome::Failure,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permitted value kinds inside `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Map(BTreeMap<String, DetailValue>),
}

pub type Details = BTreeMap<String, DetailValue>;

impl DetailValue {
    /// Convert arbitrary JSON into the permitted kinds. Nulls are dropped,
    /// arrays are kept as their JSON text.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(DetailValue::Bool(b)),
            serde_json::Value::Number(n) => n.as_f64().map(DetailValue::Number),
            serde_json::Value::String(s) => Some(DetailValue::Text(s)),
            serde_json::Value::Array(items) => {
                Some(DetailValue::Text(serde_json::Value::Array(items).to_string()))
            }
            serde_json::Value::Object(map) => Some(DetailValue::Map(
                map.into_iter()
                    .filter_map(|(k, v)| DetailValue::from_json(v).map(|v| (k, v)))
                    .collect(),
            )),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DetailValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Build `Details` from a JSON object; non-object input yields an empty map.
pub fn details_from_json(value: serde_json::Value) -> Details {
    match DetailValue::from_json(value) {
        Some(DetailValue::Map(map)) => map,
        _ => Details::new(),
    }
}

impl From<&str> for DetailValue {
    fn from(value: &str) -> Self {
        DetailValue::Text(value.to_string())
    }
}

impl From<String> for DetailValue {
    fn from(value: String) -> Self {
        DetailValue::Text(value)
    }
}

impl From<bool> for DetailValue {
    fn from(value: bool) -> Self {
        DetailValue::Bool(value)
    }
}

impl From<f64> for DetailValue {
    fn from(value: f64) -> Self {
        DetailValue::Number(value)
    }
}

impl From<i64> for DetailValue {
    fn from(value: i64) -> Self {
        DetailValue::Number(value as f64)
    }
}

impl From<u32> for DetailValue {
    fn from(value: u32) -> Self {
        DetailValue::Number(f64::from(value))
    }
}

impl From<Details> for DetailValue {
    fn from(value: Details) -> Self {
        DetailValue::Map(value)
    }
}

/// Network and session provenance. Never redacted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
}

impl SourceContext {
    pub fn new(ip_address: &str) -> Self {
        Self {
            ip_address: Some(ip_address.to_string()),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self
    }
}

/// Position and linkage of an entry within the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainData {
    pub previous_hash: String,
    pub hash: String,
    pub index: usize,
    pub merkle_root: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub event_type: String,
    pub category: Category,
    pub severity: Severity,
    pub retention_days: u32,
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
    /// Sealed subject identifier; the cleartext is never stored.
    pub subject: Option<SealedField>,
    /// Keyed digest of the subject identifier for equality search.
    pub subject_ref: Option<String>,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub action: String,
    pub outcome: Outcome,
    pub details: Details,
    pub source: SourceContext,
    /// Id of the entry this one corrects, if any.
    pub corrects: Option<String>,
    pub chain: ChainData,
    pub signature: String,
}

/// Every stored field except `hash` and `signature`, in a fixed order.
#[derive(Serialize)]
struct HashInput<'a> {
    id: &'a str,
    event_type: &'a str,
    category: Category,
    severity: Severity,
    retention_days: u32,
    timestamp: String,
    actor_id: &'a str,
    subject: Option<&'a SealedField>,
    subject_ref: Option<&'a str>,
    resource_type: &'a str,
    resource_id: Option<&'a str>,
    action: &'a str,
    outcome: Outcome,
    details: &'a Details,
    source: &'a SourceContext,
    corrects: Option<&'a str>,
    index: usize,
    previous_hash: &'a str,
}

impl AuditEntry {
    /// Canonical timestamp text used in hashes and signatures.
    pub fn canonical_timestamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    /// SHA-256 over the canonical JSON of the entry's content and position.
    pub fn calculate_hash(&self) -> Result<String> {
        let input = HashInput {
            id: &self.id,
            event_type: &self.event_type,
            category: self.category,
            severity: self.severity,
            retention_days: self.retention_days,
            timestamp: self.canonical_timestamp(),
            actor_id: &self.actor_id,
            subject: self.subject.as_ref(),
            subject_ref: self.subject_ref.as_deref(),
            resource_type: &self.resource_type,
            resource_id: self.resource_id.as_deref(),
            action: &self.action,
            outcome: self.outcome,
            details: &self.details,
            source: &self.source,
            corrects: self.corrects.as_deref(),
            index: self.chain.index,
            previous_hash: &self.chain.previous_hash,
        };

        let bytes = serde_json::to_vec(&input)?;
        Ok(sha256_tagged(&bytes))
    }

    /// Verify the stored content hash against a recomputation.
    pub fn verify_hash(&self) -> bool {
        matches!(self.calculate_hash(), Ok(hash) if hash == self.chain.hash)
    }

    /// The tuple covered by the signature.
    pub fn signing_string(&self) -> String {
        format!(
            "id:{}|timestamp:{}|hash:{}|previous_hash:{}",
            self.id,
            self.canonical_timestamp(),
            self.chain.hash,
            self.chain.previous_hash
        )
    }

    /// When the retention period ends; `None` if it lies beyond the
    /// representable calendar.
    pub fn retention_ends_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .checked_add_signed(Duration::days(i64::from(self.retention_days)))
    }

    pub fn is_genesis(&self) -> bool {
        self.chain.index == 0 && self.chain.previous_hash == GENESIS_PREVIOUS_HASH
    }

    /// Text searched by free-text queries.
    pub fn search_text(&self) -> String {
        let details = serde_json::to_string(&self.details).unwrap_or_default();
        format!("{} {} {} {}", self.event_type, self.actor_id, self.action, details)
    }

    pub fn summary(&self) -> String {
        format!(
            "#{} {} by {} ({} {}) -> {}",
            self.chain.index,
            self.event_type,
            self.actor_id,
            self.action,
            self.resource_type,
            self.outcome
        )
    }
}

/// `sha256:<hex>` digest of `bytes`.
pub fn sha256_tagged(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}
