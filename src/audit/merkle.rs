//! Merkle checkpoints and range trees
//!
//! Two digests live here. The per-entry window checkpoint hashes the
//! concatenation of the last `W` entry hashes and is stored in every entry's
//! chain data. The range tree is a binary Merkle tree over any span of
//! entry hashes, used to anchor a span with one root and prove inclusion
//! of a single entry.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audit::entry::sha256_tagged;
use crate::error::{LedgerError, Result};

pub const DEFAULT_WINDOW: usize = 8;

/// Checkpoint over a window of hashes, oldest first.
pub fn window_checkpoint<S: AsRef<str>>(hashes: &[S]) -> String {
    let combined: String = hashes.iter().map(|h| h.as_ref()).collect();
    sha256_tagged(combined.as_bytes())
}

// Leaf and inner-node digests are domain separated so neither can stand in
// for the other.
fn leaf_node(hash: &str) -> String {
    sha256_tagged(format!("leaf:{}", hash).as_bytes())
}

fn combine(left: &str, right: &str) -> String {
    sha256_tagged(format!("node:{}{}", left, right).as_bytes())
}

/// Root of the tree over `leaves`. A lone node at any level is promoted to
/// the next level unchanged.
pub fn merkle_root<S: AsRef<str>>(leaves: &[S]) -> Result<String> {
    if leaves.is_empty() {
        return Err(LedgerError::InvalidRange(
            "Cannot build Merkle tree from empty entries".to_string(),
        ));
    }

    let mut level: Vec<String> = leaves.iter().map(|h| leaf_node(h.as_ref())).collect();
    while level.len() > 1 {
        level = next_level(&level);
    }

    let root = level.remove(0);
    debug!("Merkle root over {} leaves: {}", leaves.len(), root);
    Ok(root)
}

fn next_level(level: &[String]) -> Vec<String> {
    level
        .chunks(2)
        .map(|pair| match pair.get(1) {
            Some(right) => combine(&pair[0], right),
            None => pair[0].clone(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: String,
    /// Which side the sibling sits on.
    pub side: Side,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: usize,
    pub leaf_hash: String,
    pub steps: Vec<ProofStep>,
    pub root_hash: String,
}

impl MerkleProof {
    /// Recompute the root from the leaf and the sibling path.
    pub fn verify(&self) -> bool {
        let computed = self
            .steps
            .iter()
            .fold(leaf_node(&self.leaf_hash), |current, step| match step.side {
                Side::Left => combine(&step.sibling, &current),
                Side::Right => combine(&current, &step.sibling),
            });
        computed == self.root_hash
    }

    pub fn size(&self) -> usize {
        self.steps.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "Merkle proof for leaf {}: {} hashes, root: {}",
            self.leaf_index,
            self.steps.len(),
            self.root_hash
        )
    }
}

/// Inclusion proof for `leaves[index]`.
pub fn generate_proof<S: AsRef<str>>(leaves: &[S], index: usize) -> Result<MerkleProof> {
    if index >= leaves.len() {
        return Err(LedgerError::InvalidRange(format!(
            "Leaf {} out of range ({} leaves)",
            index,
            leaves.len()
        )));
    }

    let leaf_hash = leaves[index].as_ref().to_string();
    let mut level: Vec<String> = leaves.iter().map(|h| leaf_node(h.as_ref())).collect();
    let mut position = index;
    let mut steps = Vec::new();

    while level.len() > 1 {
        if position % 2 == 1 {
            steps.push(ProofStep {
                sibling: level[position - 1].clone(),
                side: Side::Left,
            });
        } else if let Some(sibling) = level.get(position + 1) {
            steps.push(ProofStep {
                sibling: sibling.clone(),
                side: Side::Right,
            });
        }

        level = next_level(&level);
        position /= 2;
    }

    Ok(MerkleProof {
        leaf_index: index,
        leaf_hash,
        steps,
        root_hash: level.remove(0),
    })
}
