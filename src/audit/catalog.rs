//! Event Catalog
//!
//! Static registry mapping each event-type identifier to its category,
//! severity and retention period. Adding an event type is a catalog change;
//! the ledger itself never special-cases event names beyond the few it
//! emits on its own behalf.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{LedgerError, Result};

/// Six years, the HIPAA documentation retention floor.
pub const HIPAA_RETENTION_DAYS: u32 = 2190;

/// Upper bound on a catalog retention period, one hundred years.
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Well-known event type identifiers.
pub mod event_types {
    // Authentication
    pub const LOGIN_SUCCESS: &str = "login_success";
    pub const LOGIN_FAILURE: &str = "login_failure";
    pub const LOGOUT: &str = "logout";
    pub const MFA_CHALLENGE: &str = "mfa_challenge";
    pub const PASSWORD_CHANGED: &str = "password_changed";
    pub const SESSION_EXPIRED: &str = "session_expired";

    // Patient access
    pub const PATIENT_RECORD_VIEWED: &str = "patient_record_viewed";
    pub const PATIENT_RECORD_CREATED: &str = "patient_record_created";
    pub const PATIENT_RECORD_UPDATED: &str = "patient_record_updated";
    pub const PATIENT_RECORD_EXPORTED: &str = "patient_record_exported";
    pub const PRESCRIPTION_ISSUED: &str = "prescription_issued";
    pub const IMAGING_STUDY_VIEWED: &str = "imaging_study_viewed";
    pub const TRANSCRIPTION_ACCESSED: &str = "transcription_accessed";
    pub const MESSAGE_SENT: &str = "message_sent";

    // Security
    pub const PERMISSION_DENIED: &str = "permission_denied";
    pub const SUSPICIOUS_ACTIVITY: &str = "suspicious_activity";
    pub const ENCRYPTION_KEY_ROTATED: &str = "encryption_key_rotated";
    pub const DATA_BREACH_SUSPECTED: &str = "data_breach_suspected";

    // Administrative
    pub const USER_CREATED: &str = "user_created";
    pub const USER_ROLE_CHANGED: &str = "user_role_changed";
    pub const USER_DEACTIVATED: &str = "user_deactivated";
    pub const CONFIGURATION_CHANGED: &str = "configuration_changed";

    // Compliance
    pub const COMPLIANCE_VIOLATION: &str = "compliance_violation";
    pub const AUDIT_LOG_ACCESSED: &str = "audit_log_accessed";
    pub const COMPLIANCE_REPORT_GENERATED: &str = "compliance_report_generated";
    pub const AUDIT_ENTRY_CORRECTED: &str = "audit_entry_corrected";

    // System
    pub const LEDGER_INITIALIZED: &str = "ledger_initialized";
}

/// Event types the ledger emits itself; every catalog must define them.
pub const REQUIRED_EVENT_TYPES: &[&str] = &[
    event_types::LEDGER_INITIALIZED,
    event_types::AUDIT_LOG_ACCESSED,
    event_types::COMPLIANCE_REPORT_GENERATED,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Auth,
    PatientAccess,
    Security,
    Administrative,
    Compliance,
    System,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Auth => "auth",
            Category::PatientAccess => "patient_access",
            Category::Security => "security",
            Category::Administrative => "administrative",
            Category::Compliance => "compliance",
            Category::System => "system",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auth" => Ok(Category::Auth),
            "patient_access" => Ok(Category::PatientAccess),
            "security" => Ok(Category::Security),
            "administrative" => Ok(Category::Administrative),
            "compliance" => Ok(Category::Compliance),
            "system" => Ok(Category::System),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub category: Category,
    pub severity: Severity,
    pub retention_days: u32,
    #[serde(default)]
    pub description: String,
}

impl CatalogEntry {
    fn new(category: Category, severity: Severity, retention_days: u32, description: &str) -> Self {
        Self {
            category,
            severity,
            retention_days,
            description: description.to_string(),
        }
    }
}

/// Versioned, immutable event registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCatalog {
    pub version: String,
    pub events: BTreeMap<String, CatalogEntry>,
}

impl EventCatalog {
    pub const BUILTIN_VERSION: &'static str = "2024.1";

    /// Construct a catalog and check it defines the ledger's own event types.
    pub fn new(version: String, events: BTreeMap<String, CatalogEntry>) -> Result<Self> {
        let catalog = Self { version, events };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn builtin() -> Self {
        use event_types::*;
        use Category::*;
        use Severity::*;

        let seven_years = 2555;
        let rows: Vec<(&str, CatalogEntry)> = vec![
            (LOGIN_SUCCESS, CatalogEntry::new(Auth, Low, HIPAA_RETENTION_DAYS, "Successful sign-in")),
            (LOGIN_FAILURE, CatalogEntry::new(Auth, Medium, HIPAA_RETENTION_DAYS, "Rejected sign-in attempt")),
            (LOGOUT, CatalogEntry::new(Auth, Low, HIPAA_RETENTION_DAYS, "User signed out")),
            (MFA_CHALLENGE, CatalogEntry::new(Auth, Low, HIPAA_RETENTION_DAYS, "Second factor requested")),
            (PASSWORD_CHANGED, CatalogEntry::new(Auth, Medium, HIPAA_RETENTION_DAYS, "Credential changed")),
            (SESSION_EXPIRED, CatalogEntry::new(Auth, Low, HIPAA_RETENTION_DAYS, "Session timed out")),
            (PATIENT_RECORD_VIEWED, CatalogEntry::new(PatientAccess, Medium, seven_years, "Patient chart opened")),
            (PATIENT_RECORD_CREATED, CatalogEntry::new(PatientAccess, Medium, seven_years, "Patient record created")),
            (PATIENT_RECORD_UPDATED, CatalogEntry::new(PatientAccess, Medium, seven_years, "Patient record modified")),
            (PATIENT_RECORD_EXPORTED, CatalogEntry::new(PatientAccess, High, seven_years, "Patient data left the system")),
            (PRESCRIPTION_ISSUED, CatalogEntry::new(PatientAccess, Medium, seven_years, "Prescription written")),
            (IMAGING_STUDY_VIEWED, CatalogEntry::new(PatientAccess, Medium, seven_years, "Imaging study opened")),
            (TRANSCRIPTION_ACCESSED, CatalogEntry::new(PatientAccess, Medium, seven_years, "Clinical transcription accessed")),
            (MESSAGE_SENT, CatalogEntry::new(PatientAccess, Low, seven_years, "Secure message sent")),
            (PERMISSION_DENIED, CatalogEntry::new(Security, Medium, HIPAA_RETENTION_DAYS, "Access control rejected a request")),
            (SUSPICIOUS_ACTIVITY, CatalogEntry::new(Security, High, HIPAA_RETENTION_DAYS, "Anomalous behaviour detected")),
            (ENCRYPTION_KEY_ROTATED, CatalogEntry::new(Security, Medium, HIPAA_RETENTION_DAYS, "Encryption key rotated")),
            (DATA_BREACH_SUSPECTED, CatalogEntry::new(Security, Critical, seven_years, "Possible breach of protected data")),
            (USER_CREATED, CatalogEntry::new(Administrative, Medium, HIPAA_RETENTION_DAYS, "Account provisioned")),
            (USER_ROLE_CHANGED, CatalogEntry::new(Administrative, High, HIPAA_RETENTION_DAYS, "Role or permission changed")),
            (USER_DEACTIVATED, CatalogEntry::new(Administrative, Medium, HIPAA_RETENTION_DAYS, "Account deactivated")),
            (CONFIGURATION_CHANGED, CatalogEntry::new(Administrative, High, HIPAA_RETENTION_DAYS, "System configuration changed")),
            (COMPLIANCE_VIOLATION, CatalogEntry::new(Compliance, High, seven_years, "Policy violation recorded")),
            (AUDIT_LOG_ACCESSED, CatalogEntry::new(Compliance, Low, HIPAA_RETENTION_DAYS, "Audit trail searched")),
            (COMPLIANCE_REPORT_GENERATED, CatalogEntry::new(Compliance, Low, HIPAA_RETENTION_DAYS, "Compliance report produced")),
            (AUDIT_ENTRY_CORRECTED, CatalogEntry::new(Compliance, Medium, seven_years, "Correction to an earlier entry")),
            (LEDGER_INITIALIZED, CatalogEntry::new(System, Low, seven_years, "Genesis entry")),
        ];

        Self {
            version: Self::BUILTIN_VERSION.to_string(),
            events: rows
                .into_iter()
                .map(|(name, entry)| (name.to_string(), entry))
                .collect(),
        }
    }

    /// Look up an event type, failing with `UnknownEventType`.
    pub fn lookup(&self, event_type: &str) -> Result<&CatalogEntry> {
        self.events
            .get(event_type)
            .ok_or_else(|| LedgerError::UnknownEventType(event_type.to_string()))
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.events.contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CatalogEntry)> {
        self.events.iter()
    }

    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(LedgerError::Config("Event catalog has no version".to_string()));
        }

        for required in REQUIRED_EVENT_TYPES {
            if !self.contains(required) {
                return Err(LedgerError::Config(format!(
                    "Event catalog {} is missing required event type {}",
                    self.version, required
                )));
            }
        }

        for (name, entry) in &self.events {
            if name.trim().is_empty() {
                return Err(LedgerError::Config("Event catalog contains an empty event type".to_string()));
            }
            if entry.retention_days == 0 {
                return Err(LedgerError::Config(format!(
                    "Event type {} has zero retention",
                    name
                )));
            }
            if entry.retention_days > MAX_RETENTION_DAYS {
                return Err(LedgerError::Config(format!(
                    "Event type {} retention of {} days exceeds {}",
                    name, entry.retention_days, MAX_RETENTION_DAYS
                )));
            }
        }

        Ok(())
    }
}

impl Default for EventCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
