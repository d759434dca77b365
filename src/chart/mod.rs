//! Parse charts.
//!
//! The parser records a [`RawChart`]: for each derived item, every way it was
//! derived (one predecessor for a shift, a predecessor and a closed child for
//! a complete). [`cky::get_cky_chart`] collapses the shift/complete chains of
//! one rule instance into a [`CkyChart`], where each closed item maps to its
//! expansions: one child item per nonterminal slot of its rule.

pub mod cky;
pub mod kbest;
pub mod persist;

use crate::graph::NonterminalLabel;
use crate::item::ItemRef;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A chart key: the goal or an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChartKey {
    /// The goal; its productions are the accepted items.
    Start,
    /// A derived item.
    Item(ItemRef),
}

impl ChartKey {
    /// The item, unless this is the goal.
    pub fn item(&self) -> Option<&ItemRef> {
        match self {
            Self::Start => None,
            Self::Item(item) => Some(item),
        }
    }

    /// Returns `true` for the goal key.
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }
}

impl fmt::Display for ChartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("START"),
            Self::Item(item) => write!(f, "{item}"),
        }
    }
}

/// One derivation step recorded by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RawProduction {
    /// Shift from the predecessor, or acceptance of an item under START.
    Unary(ItemRef),
    /// Completion of the predecessor with a closed child.
    Binary(ItemRef, ItemRef),
}

/// Chart as built by the parser.
#[derive(Debug, Clone, Default)]
pub struct RawChart {
    entries: IndexMap<ChartKey, IndexSet<RawProduction>>,
}

impl RawChart {
    /// Creates an empty chart.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a production; returns `false` if it was already known.
    pub fn add(&mut self, key: ChartKey, production: RawProduction) -> bool {
        self.entries.entry(key).or_default().insert(production)
    }

    /// Productions of `key`.
    pub fn get(&self, key: &ChartKey) -> Option<&IndexSet<RawProduction>> {
        self.entries.get(key)
    }

    /// Items accepted under START.
    pub fn accepted(&self) -> impl Iterator<Item = &ItemRef> {
        self.entries
            .get(&ChartKey::Start)
            .into_iter()
            .flatten()
            .filter_map(|p| match p {
                RawProduction::Unary(item) => Some(item),
                RawProduction::Binary(..) => None,
            })
    }

    /// Whether anything was accepted.
    pub fn has_parse(&self) -> bool {
        self.entries
            .get(&ChartKey::Start)
            .is_some_and(|prods| !prods.is_empty())
    }

    /// Number of keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A nonterminal slot of an expansion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Slot {
    /// The single slot of a START expansion.
    Start,
    /// A nonterminal edge of the parent rule.
    Nt(NonterminalLabel),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("START"),
            Self::Nt(label) => write!(f, "{label}"),
        }
    }
}

/// Children of one rule application, keyed by slot.
pub type Expansion = BTreeMap<Slot, ItemRef>;

/// Size figures of a [`CkyChart`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChartStats {
    /// Expansions under START.
    pub start_productions: usize,
    /// Keys in the chart.
    pub keys: usize,
    /// Child references over all expansions.
    pub child_refs: usize,
}

/// Chart where every closed item maps to its one-rule expansions.
#[derive(Debug, Clone, Default)]
pub struct CkyChart {
    entries: IndexMap<ChartKey, Vec<Expansion>>,
}

impl CkyChart {
    /// Creates an empty chart.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expansions of `key`.
    pub fn insert(&mut self, key: ChartKey, expansions: Vec<Expansion>) {
        self.entries.insert(key, expansions);
    }

    /// Expansions of `key`.
    pub fn get(&self, key: &ChartKey) -> Option<&[Expansion]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Whether `key` has expansions.
    pub fn contains(&self, key: &ChartKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Expansions under START, empty when nothing was accepted.
    pub fn start_productions(&self) -> &[Expansion] {
        self.get(&ChartKey::Start).unwrap_or(&[])
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &ChartKey> {
        self.entries.keys()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&ChartKey, &[Expansion])> {
        self.entries.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Number of keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the chart has no keys.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counts START productions, keys and child references.
    pub fn stats(&self) -> ChartStats {
        ChartStats {
            start_productions: self.start_productions().len(),
            keys: self.entries.len(),
            child_refs: self.entries.values().flatten().map(BTreeMap::len).sum(),
        }
    }
}
