//! Ledger Store
//!
//! The authoritative ordered sequence of entries plus an id index. Position
//! in `entries` is the entry's chain index; `append` refuses anything that
//! would break that.

use std::collections::HashMap;
use std::sync::Arc;

use crate::audit::entry::{AuditEntry, GENESIS_PREVIOUS_HASH};
use crate::error::{LedgerError, Result};

#[derive(Debug, Default)]
pub struct LedgerStore {
    entries: Vec<Arc<AuditEntry>>,
    by_id: HashMap<String, usize>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from replayed entries, checking positions and links.
    pub fn from_entries(entries: Vec<AuditEntry>) -> Result<Self> {
        let mut store = Self::new();
        for entry in entries {
            let position = store.len();
            let expected_prev = match store.last() {
                Some(prev) => prev.chain.hash.clone(),
                None => GENESIS_PREVIOUS_HASH.to_string(),
            };
            if entry.chain.previous_hash != expected_prev {
                return Err(LedgerError::Recovery(format!(
                    "Hash chain broken at entry {}: expected {}, got {}",
                    position, expected_prev, entry.chain.previous_hash
                )));
            }
            store
                .append(Arc::new(entry))
                .map_err(|e| LedgerError::Recovery(e.to_string()))?;
        }
        Ok(store)
    }

    /// Append a fully linked entry. Its index must equal the current length
    /// and its id must be new.
    pub fn append(&mut self, entry: Arc<AuditEntry>) -> Result<()> {
        let position = self.entries.len();
        if entry.chain.index != position {
            return Err(LedgerError::LedgerWriteConflict(format!(
                "entry {} claims index {} but the next position is {}",
                entry.id, entry.chain.index, position
            )));
        }
        if self.by_id.contains_key(&entry.id) {
            return Err(LedgerError::LedgerWriteConflict(format!(
                "entry id {} already present",
                entry.id
            )));
        }

        self.by_id.insert(entry.id.clone(), position);
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<AuditEntry>> {
        self.by_id.get(id).map(|&position| &self.entries[position])
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn at(&self, index: usize) -> Option<&Arc<AuditEntry>> {
        self.entries.get(index)
    }

    /// Entries in `[start, end)`, clamped to the committed tail.
    pub fn range(&self, start: usize, end: usize) -> &[Arc<AuditEntry>] {
        let end = end.min(self.entries.len());
        let start = start.min(end);
        &self.entries[start..end]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Arc<AuditEntry>> {
        self.entries.last()
    }

    /// Hashes of the last `n` entries, oldest first.
    pub fn recent_hashes(&self, n: usize) -> Vec<&str> {
        let start = self.entries.len().saturating_sub(n);
        self.entries[start..]
            .iter()
            .map(|e| e.chain.hash.as_str())
            .collect()
    }

    /// Cheap point-in-time copy for lock-free reading.
    pub fn snapshot(&self) -> Vec<Arc<AuditEntry>> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::catalog::{Category, Severity};
    use crate::audit::entry::{ChainData, Details, Outcome, SourceContext};
    use chrono::Utc;

    fn entry(index: usize, id: &str, prev: &str) -> AuditEntry {
        AuditEntry {
            id: id.to_string(),
            event_type: "logout".to_string(),
            category: Category::Auth,
            severity: Severity::Low,
            retention_days: 2190,
            timestamp: Utc::now(),
            actor_id: "alice".to_string(),
            subject: None,
            subject_ref: None,
            resource_type: "session".to_string(),
            resource_id: None,
            action: "logout".to_string(),
            outcome: Outcome::Success,
            details: Details::new(),
            source: SourceContext::default(),
            corrects: None,
            chain: ChainData {
                previous_hash: prev.to_string(),
                hash: format!("sha256:{}", id),
                index,
                merkle_root: String::new(),
            },
            signature: String::new(),
        }
    }

    #[test]
    fn test_append_and_lookup() {
        let mut store = LedgerStore::new();
        store.append(Arc::new(entry(0, "a", "0"))).unwrap();
        store.append(Arc::new(entry(1, "b", "sha256:a"))).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("b").unwrap().chain.index, 1);
        assert_eq!(store.position("a"), Some(0));
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_index_mismatch_is_conflict() {
        let mut store = LedgerStore::new();
        store.append(Arc::new(entry(0, "a", "0"))).unwrap();

        let result = store.append(Arc::new(entry(0, "b", "sha256:a")));
        assert!(matches!(result, Err(LedgerError::LedgerWriteConflict(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_id_is_conflict() {
        let mut store = LedgerStore::new();
        store.append(Arc::new(entry(0, "a", "0"))).unwrap();
        let result = store.append(Arc::new(entry(1, "a", "sha256:a")));
        assert!(matches!(result, Err(LedgerError::LedgerWriteConflict(_))));
    }

    #[test]
    fn test_range_is_clamped() {
        let mut store = LedgerStore::new();
        store.append(Arc::new(entry(0, "a", "0"))).unwrap();
        store.append(Arc::new(entry(1, "b", "sha256:a"))).unwrap();

        assert_eq!(store.range(0, 10).len(), 2);
        assert_eq!(store.range(1, 2)[0].id, "b");
        assert!(store.range(5, 9).is_empty());
        assert_eq!(store.recent_hashes(8), vec!["sha256:a", "sha256:b"]);
    }

    #[test]
    fn test_recovery_detects_broken_link() {
        let entries = vec![entry(0, "a", "0"), entry(1, "b", "sha256:zzz")];
        assert!(matches!(
            LedgerStore::from_entries(entries),
            Err(LedgerError::Recovery(_))
        ));

        let entries = vec![entry(0, "a", "0"), entry(1, "b", "sha256:a")];
        assert_eq!(LedgerStore::from_entries(entries).unwrap().len(), 2);
    }
}
