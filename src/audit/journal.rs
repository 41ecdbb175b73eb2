//! Durable journal
//!
//! Write-ahead persistence for the ledger. An entry is written to the
//! journal before the in-memory store sees it; if the write fails the entry
//! is abandoned. On start-up the journal is replayed to rebuild the store
//! and recover the tail hash.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::audit::entry::AuditEntry;
use crate::config::JournalConfig;
use crate::database::SqliteJournal;
use crate::error::{LedgerError, Result};

pub enum Journal {
    /// Process-lifetime only.
    Memory,
    File(FileJournal),
    Sqlite(SqliteJournal),
}

impl Journal {
    pub async fn open(config: &JournalConfig) -> Result<Self> {
        match config {
            JournalConfig::Memory => Ok(Journal::Memory),
            JournalConfig::File { path } => Ok(Journal::File(FileJournal::open(path)?)),
            JournalConfig::Sqlite { url } => Ok(Journal::Sqlite(SqliteJournal::connect(url).await?)),
        }
    }

    pub async fn load(&self) -> Result<Vec<AuditEntry>> {
        match self {
            Journal::Memory => Ok(Vec::new()),
            Journal::File(file) => file.load(),
            Journal::Sqlite(db) => db.load_all().await,
        }
    }

    pub async fn append(&mut self, entry: &AuditEntry) -> Result<()> {
        match self {
            Journal::Memory => Ok(()),
            Journal::File(file) => file.append(entry),
            Journal::Sqlite(db) => db.append(entry).await,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Journal::Memory => "memory".to_string(),
            Journal::File(file) => format!("file {:?}", file.path()),
            Journal::Sqlite(_) => "sqlite".to_string(),
        }
    }
}

/// Append-only JSONL file, one entry per line.
pub struct FileJournal {
    path: PathBuf,
    file: File,
}

impl FileJournal {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    LedgerError::Storage(format!("Failed to create journal directory: {}", e))
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| LedgerError::Storage(format!("Failed to open journal {:?}: {}", path, e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<AuditEntry>> {
        let entries = load_journal_file(&self.path)?;
        info!("Replayed {} journal entries from {:?}", entries.len(), self.path);
        Ok(entries)
    }

    pub fn append(&mut self, entry: &AuditEntry) -> Result<()> {
        let json = serde_json::to_string(entry)?;
        append_line(&mut self.file, &json)?;
        debug!("Journaled entry {}", entry.chain.index);
        Ok(())
    }
}

/// Durable byte sink under a JSONL journal.
trait JournalSink: Write {
    fn committed_len(&self) -> io::Result<u64>;
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl JournalSink for File {
    fn committed_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.sync_data()
    }
}

fn write_record<S: JournalSink>(sink: &mut S, line: &str) -> io::Result<()> {
    writeln!(sink, "{}", line)?;
    sink.flush()?;
    sink.sync()
}

/// Write one record and make it durable. On failure the sink is cut back to
/// its prior length so no partial or orphaned record survives; if that also
/// fails the journal can no longer be trusted.
fn append_line<S: JournalSink>(sink: &mut S, line: &str) -> Result<()> {
    let committed = sink
        .committed_len()
        .map_err(|e| LedgerError::Storage(format!("Failed to stat journal: {}", e)))?;

    if let Err(write_err) = write_record(sink, line) {
        if let Err(truncate_err) = sink.truncate(committed) {
            error!(
                "Journal rollback to {} bytes failed after write error ({}): {}",
                committed, write_err, truncate_err
            );
            return Err(LedgerError::JournalCorrupted(format!(
                "write failed ({}) and rollback to {} bytes failed ({})",
                write_err, committed, truncate_err
            )));
        }
        warn!("Journal write failed, rolled back to {} bytes: {}", committed, write_err);
        return Err(LedgerError::Storage(format!("Failed to write to journal: {}", write_err)));
    }

    Ok(())
}

/// Read every entry from a JSONL journal, skipping blank lines.
pub fn load_journal_file(path: &Path) -> Result<Vec<AuditEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)
        .map_err(|e| LedgerError::Storage(format!("Failed to open journal {:?}: {}", path, e)))?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| {
            LedgerError::Storage(format!("Failed to read line {}: {}", line_num + 1, e))
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let entry: AuditEntry = serde_json::from_str(&line).map_err(|e| {
            LedgerError::Recovery(format!("Failed to parse entry at line {}: {}", line_num + 1, e))
        })?;
        entries.push(entry);
    }

    Ok(entries)
}
