//! Deterministic Merkle tree over proof-of-existence leaves (§4.4).
//!
//! Leaves are hex-encoded SHA-256 digests (the `data_hash` of each
//! [`crate::storage::ProofRecord`], in insertion order — I3). Parent
//! hashes are `SHA-256(hex(left) || hex(right))`; an odd level duplicates
//! its last element so every level has an even count before pairing.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: String,
    pub position: Position,
}

fn parent_hash(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hex::encode(hasher.finalize())
}

/// Builds every level of the tree, leaves first. `levels[0]` is the leaf
/// row; the last entry is always a single-element row holding the root.
fn build_levels(leaves: &[String]) -> Vec<Vec<String>> {
    if leaves.is_empty() {
        return vec![vec![]];
    }
    let mut levels = vec![leaves.to_vec()];
    while levels.last().unwrap().len() > 1 {
        let current = levels.last().unwrap();
        let mut next = Vec::with_capacity(current.len().div_ceil(2));
        let mut i = 0;
        while i < current.len() {
            let left = &current[i];
            let right = if i + 1 < current.len() {
                &current[i + 1]
            } else {
                left // odd level: duplicate the last element
            };
            next.push(parent_hash(left, right));
            i += 2;
        }
        levels.push(next);
    }
    levels
}

/// The tree root. Empty tree roots to `""`; a single-leaf tree roots to
/// that leaf's own hash, with no self-pairing step (§9).
pub fn root(leaves: &[String]) -> String {
    let levels = build_levels(leaves);
    levels.last().and_then(|l| l.first()).cloned().unwrap_or_default()
}

/// Builds the inclusion proof for `leaf_index`: the sequence of sibling
/// hashes and their position, from the leaf row up to (but not including)
/// the root.
pub fn prove(leaves: &[String], leaf_index: usize) -> Option<Vec<ProofStep>> {
    if leaf_index >= leaves.len() {
        return None;
    }
    let levels = build_levels(leaves);
    let mut steps = Vec::new();
    let mut index = leaf_index;
    for level in &levels[..levels.len() - 1] {
        let is_right_child = index % 2 == 1;
        let sibling_index = if is_right_child { index - 1 } else { index + 1 };
        let sibling = if sibling_index < level.len() {
            level[sibling_index].clone()
        } else {
            level[index].clone() // odd level: sibling is a duplicate of self
        };
        let position = if is_right_child {
            Position::Left
        } else {
            Position::Right
        };
        steps.push(ProofStep { sibling, position });
        index /= 2;
    }
    Some(steps)
}

/// Recomputes the root from `leaf_hash` and its inclusion proof, and
/// compares against `expected_root`.
pub fn verify(leaf_hash: &str, proof: &[ProofStep], expected_root: &str) -> bool {
    let mut current = leaf_hash.to_string();
    for step in proof {
        current = match step.position {
            Position::Left => parent_hash(&step.sibling, &current),
            Position::Right => parent_hash(&current, &step.sibling),
        };
    }
    current == expected_root
}
