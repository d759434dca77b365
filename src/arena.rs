//! Arena storage for hypergraph nodes.
//!
//! Provides `NodeId` (a dense, total-orderable identifier) and `NodeArena`
//! (contiguous storage). Hypergraphs only ever grow while they are being
//! built, so the arena has no free list: ids are handed out in allocation
//! order and stay valid for the lifetime of the graph.
//!
//! # Determinism
//! - `NodeId` ordering is by its inner `u32`.
//! - Iteration order over slots is by index (allocation order).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense node identifier, an index into a graph's node arena.
///
/// Ids are only meaningful relative to the graph that allocated them: a rule
/// fragment and an input graph both start counting at zero.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a new `NodeId` from a raw `u32`.
    ///
    /// The caller must ensure the index is within bounds of the arena that
    /// will be queried with it.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw index.
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Contiguous node storage indexed by `NodeId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeArena<T> {
    slots: Vec<T>,
}

impl<T> NodeArena<T> {
    /// Creates a new empty arena.
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Stores `data` in a fresh slot and returns its id.
    pub fn allocate(&mut self, data: T) -> NodeId {
        let idx = self.slots.len() as u32;
        self.slots.push(data);
        NodeId(idx)
    }

    /// Returns a reference to the data stored at `id`, if present.
    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.slots.get(id.index())
    }

    /// Returns a mutable reference to the data stored at `id`, if present.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.slots.get_mut(id.index())
    }

    /// Returns whether `id` addresses a slot of this arena.
    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.slots.len()
    }

    /// Number of allocated nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if nothing has been allocated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates over all nodes in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(idx, data)| (NodeId(idx as u32), data))
    }

    /// Iterates over all ids in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.slots.len() as u32).map(NodeId)
    }
}

impl<T> Default for NodeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
