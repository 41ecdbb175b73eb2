use thiserror::Error;

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(format!("Database error: {}", err))
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(format!("I/O error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Sealing failed: {0}")]
    SealingFailed(String),

    #[error("Sealing did not complete within {0} ms")]
    SealTimeout(u64),

    /// The single-writer invariant was violated. Fatal: the ledger halts.
    #[error("Ledger write conflict: {0}")]
    LedgerWriteConflict(String),

    /// A failed journal write could not be rolled back. Fatal: the ledger halts.
    #[error("Journal left inconsistent: {0}")]
    JournalCorrupted(String),

    #[error("Ledger is halted after a fatal write failure; operator investigation required")]
    LedgerHalted,

    #[error("Unknown audit entry: {0}")]
    UnknownEntry(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    #[error("Journal recovery failed: {0}")]
    Recovery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

impl LedgerError {
    /// Whether the caller may retry after fixing its request or the
    /// external dependency. Write conflicts and halts are never retryable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownEventType(_)
                | Self::UnknownEntry(_)
                | Self::InvalidRange(_)
                | Self::SealingFailed(_)
                | Self::SealTimeout(_)
                | Self::Timeout(_)
        )
    }

    /// Errors after which no further append may be attempted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LedgerWriteConflict(_) | Self::JournalCorrupted(_))
    }

    pub fn invalid_range(start: usize, end: usize, len: usize) -> Self {
        Self::InvalidRange(format!(
            "[{}, {}] is outside the ledger (length {})",
            start, end, len
        ))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
