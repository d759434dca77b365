//! Deterministic hashing for hypergraphs.
//!
//! Two layers:
//! - `HashValue`: a domain-separated, length-prefixed SHA-256 digest, used
//!   wherever bytes need a stable identity (label sets, chart item records).
//! - `structural_hash`: the additive node-signature hash that defines
//!   hypergraph equality.
//!
//! # Determinism
//! Every input is ordered before it is fed to the hasher: label sets are
//! sorted and deduplicated, and node depths are breadth-first distances,
//! which do not depend on the order roots were declared in.

use crate::graph::{Hypergraph, NodeId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Depth multiplier applied to each node's signature.
const DEPTH_FACTOR: u64 = 13;

/// A 256-bit hash value.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashValue(pub [u8; 32]);

impl HashValue {
    /// Creates a zero hash (all zeros).
    #[inline]
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Returns the raw byte array.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes SHA-256 of the given data with domain separation.
    ///
    /// The hashed message is `b"HRG:<domain>:v1" || len(data) as u64 LE || data`.
    pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"HRG:");
        hasher.update(domain);
        hasher.update(b":v1");
        hasher.update((data.len() as u64).to_le_bytes());
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// First eight bytes, little endian.
    ///
    /// Used where an additive `u64` combination of hashes is needed.
    #[inline]
    pub fn prefix_u64(&self) -> u64 {
        let mut head = [0u8; 8];
        head.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(head)
    }
}

impl std::fmt::Display for HashValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HashValue({:02x}{:02x}{:02x}{:02x}…)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Appends a length-prefixed string to a hash input buffer.
pub(crate) fn push_str(data: &mut Vec<u8>, s: &str) {
    data.extend_from_slice(&(s.len() as u64).to_le_bytes());
    data.extend_from_slice(s.as_bytes());
}

/// Hash of a set of outgoing edge labels.
///
/// The set is taken as given (already sorted and distinct by construction).
pub fn label_set_hash(labels: &BTreeSet<String>) -> u64 {
    let mut data = Vec::new();
    data.extend_from_slice(&(labels.len() as u64).to_le_bytes());
    for label in labels {
        push_str(&mut data, label);
    }
    HashValue::hash_with_domain(b"OUT_LABELS", &data).prefix_u64()
}

/// Structural hash of a hypergraph.
///
/// Walks the graph breadth first from all roots at once; each node
/// contributes `label_set_hash(outgoing labels) + 13 * depth`, where depth is
/// the distance from the nearest root. Contributions are summed with
/// wrapping arithmetic, so the result does not depend on node names or ids.
///
/// Nodes that cannot be reached from any root are visited afterwards, in
/// allocation order, as if they were additional roots.
pub fn structural_hash(graph: &Hypergraph) -> u64 {
    let mut depth: HashMap<NodeId, u64> = HashMap::with_capacity(graph.node_count());
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    let mut total: u64 = 0;

    // All roots start at depth 0 before the walk begins.
    for &root in graph.roots() {
        if depth.insert(root, 0).is_none() {
            queue.push_back(root);
        }
    }
    let stragglers: Vec<NodeId> = graph.node_ids().collect();
    let mut next_straggler = stragglers.iter();
    loop {
        if queue.is_empty() {
            match next_straggler.find(|n| !depth.contains_key(n)) {
                Some(&seed) => {
                    depth.insert(seed, 0);
                    queue.push_back(seed);
                }
                None => break,
            }
        }
        while let Some(node) = queue.pop_front() {
            let d = depth.get(&node).copied().unwrap_or_default();
            let mut labels = BTreeSet::new();
            for triple in graph.out_edges(node) {
                labels.insert(triple.label.to_string());
                for &tail in &triple.tails {
                    if !depth.contains_key(&tail) {
                        depth.insert(tail, d + 1);
                        queue.push_back(tail);
                    }
                }
            }
            total = total
                .wrapping_add(label_set_hash(&labels))
                .wrapping_add(DEPTH_FACTOR.wrapping_mul(d));
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_separation() {
        let a = HashValue::hash_with_domain(b"A", b"payload");
        let b = HashValue::hash_with_domain(b"B", b"payload");
        assert_ne!(a, b);
        assert_eq!(a, HashValue::hash_with_domain(b"A", b"payload"));
        assert_ne!(a, HashValue::zero());
    }

    #[test]
    fn label_set_hash_is_order_free_by_construction() {
        let one: BTreeSet<String> = ["b", "a"].iter().map(|s| s.to_string()).collect();
        let two: BTreeSet<String> = ["a", "b", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(label_set_hash(&one), label_set_hash(&two));
        let three: BTreeSet<String> = ["a"].iter().map(|s| s.to_string()).collect();
        assert_ne!(label_set_hash(&one), label_set_hash(&three));
    }

    #[test]
    fn structural_hash_ignores_node_names() {
        let g1 = Hypergraph::from_string("(x. :A (y. :B z.))").unwrap();
        let g2 = Hypergraph::from_string("(p. :A (q. :B r.))").unwrap();
        assert_eq!(structural_hash(&g1), structural_hash(&g2));

        let g3 = Hypergraph::from_string("(x. :A (y. :C z.))").unwrap();
        assert_ne!(structural_hash(&g1), structural_hash(&g3));
    }
}
