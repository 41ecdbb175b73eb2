//! Chain Linker
//!
//! Assigns an entry its position, predecessor hash, content hash and window
//! checkpoint against the current tail. Linking is not idempotent: linking
//! the same draft twice yields two distinct positions. Only the ledger's
//! single append path calls this, under the writer lock.

use crate::audit::entry::{AuditEntry, ChainData, GENESIS_PREVIOUS_HASH};
use crate::audit::merkle::window_checkpoint;
use crate::audit::store::LedgerStore;
use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, Copy)]
pub struct ChainLinker {
    window: usize,
}

impl ChainLinker {
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(LedgerError::Config("Merkle window must be at least 1".to_string()));
        }
        Ok(Self { window })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Link `entry` after the store's tail. The store is not modified.
    pub fn link(&self, mut entry: AuditEntry, store: &LedgerStore) -> Result<AuditEntry> {
        let index = store.len();
        let previous_hash = match store.last() {
            Some(prev) => {
                // Keep timestamps non-decreasing along the chain.
                if entry.timestamp < prev.timestamp {
                    entry.timestamp = prev.timestamp;
                }
                prev.chain.hash.clone()
            }
            None => GENESIS_PREVIOUS_HASH.to_string(),
        };

        entry.chain = ChainData {
            previous_hash,
            hash: String::new(),
            index,
            merkle_root: String::new(),
        };
        entry.chain.hash = entry.calculate_hash()?;

        let mut window = store.recent_hashes(self.window - 1);
        window.push(&entry.chain.hash);
        entry.chain.merkle_root = window_checkpoint(&window);

        Ok(entry)
    }
}
