//! The hypergraph data structure shared by input graphs and rule fragments.
//!
//! A hypergraph is a set of named nodes (with optional node labels) and a
//! list of hyperedges `(source, label, tails)`. Some nodes are roots, some are
//! external nodes (ports) with a 0-based rank.
//!
//! # Invariants
//! - Every edge endpoint is a node of this graph.
//! - Node names are unique; anonymous nodes receive `_<k>` names.
//! - `rev_external` is the inverse of `external`.
//! - The memoized triple order is valid until the next mutation; every
//!   mutating method drops it, and `refresh` drops it explicitly.
//!
//! # Determinism
//! `triples()` is a breadth-first walk from the roots (in root order); the
//! outgoing edges of a node are visited in stable label-string order. Nodes
//! unreachable from the roots are walked afterwards in allocation order, so
//! every edge appears exactly once.

use super::label::{EdgeLabel, NonterminalLabel};
use crate::arena::{NodeArena, NodeId};
use crate::error::{GraphError, GraphResult};
use crate::fingerprint::structural_hash;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Position of an edge in a graph's memoized `triples()` order.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(u32);

impl EdgeId {
    /// Creates an edge id from a raw index.
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

/// One hyperedge: a source node, a label and an ordered list of tails.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    /// Source node.
    pub source: NodeId,
    /// Edge label.
    pub label: EdgeLabel,
    /// Tail nodes, in order. May be empty.
    pub tails: Vec<NodeId>,
}

impl Triple {
    /// Number of tails.
    #[inline]
    pub fn arity(&self) -> usize {
        self.tails.len()
    }
}

/// A triple with its endpoints' node labels attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledTriple<'a> {
    /// Source node and its label.
    pub source: (NodeId, Option<&'a str>),
    /// Edge label.
    pub label: &'a EdgeLabel,
    /// Tail nodes and their labels.
    pub tails: Vec<(NodeId, Option<&'a str>)>,
}

/// Key used by the terminal reachability filter.
///
/// Without node labels only `label` is set; with node labels the source and
/// tail labels take part in the comparison too.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TerminalKey {
    /// Terminal edge label.
    pub label: String,
    /// Source node label (node-label mode only).
    pub source_label: Option<String>,
    /// Tail node labels (node-label mode only).
    pub tail_labels: Vec<Option<String>>,
}

/// Per-node data stored in the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeData {
    /// Unique node name.
    pub name: String,
    /// Optional node label (concept).
    pub label: Option<String>,
}

/// A directed hypergraph with roots and ranked external nodes.
///
/// Equality and hashing are structural: two graphs are equal when their
/// `structural_hash` agrees, regardless of node names.
#[derive(Debug, Clone, Default)]
pub struct Hypergraph {
    nodes: NodeArena<NodeData>,
    names: HashMap<String, NodeId>,
    edges: Vec<Triple>,
    out_edges: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
    roots: Vec<NodeId>,
    external: BTreeMap<NodeId, u32>,
    rev_external: BTreeMap<u32, NodeId>,
    ordered: OnceLock<Vec<Triple>>,
}

impl Hypergraph {
    /// Creates an empty hypergraph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a graph description (see the `description` module).
    pub fn from_string(text: &str) -> GraphResult<Self> {
        super::description::parse(text)
    }

    /// Builds a chain graph from a token sequence.
    ///
    /// Token `i` becomes an edge from node `_i` to node `_{i+1}`; tokens
    /// containing `$` become nonterminal edges. The first node is the root and
    /// the last node is external node 0.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> GraphResult<Self> {
        let mut graph = Self::new();
        let mut auto_index = 0;
        let mut prev = graph.add_node("_0", None);
        graph.add_root(prev)?;
        let mut offset = 0;
        for (i, token) in tokens.iter().enumerate() {
            let token = token.as_ref();
            let label = EdgeLabel::from_token(token, &mut auto_index).ok_or_else(|| {
                GraphError::Syntax {
                    offset,
                    message: format!("malformed nonterminal '{token}'"),
                }
            })?;
            let next = graph.add_node(&format!("_{}", i + 1), None);
            graph.add_edge(prev, label, vec![next])?;
            prev = next;
            offset += token.len() + 1;
        }
        graph.set_external(prev, 0)?;
        Ok(graph)
    }

    /// Builds a graph from named triples.
    ///
    /// `labels` assigns node labels by name. When `roots` is `None` the roots
    /// are computed with [`Hypergraph::find_roots`].
    pub fn from_triples<I>(
        triples: I,
        labels: &BTreeMap<String, String>,
        roots: Option<&[String]>,
    ) -> GraphResult<Self>
    where
        I: IntoIterator<Item = (String, EdgeLabel, Vec<String>)>,
    {
        let mut graph = Self::new();
        for (source, label, tails) in triples {
            let src = graph.add_node(&source, labels.get(&source).map(String::as_str));
            let tails = tails
                .iter()
                .map(|t| graph.add_node(t, labels.get(t).map(String::as_str)))
                .collect();
            graph.add_edge(src, label, tails)?;
        }
        match roots {
            Some(names) => {
                for name in names {
                    let id = graph
                        .node_by_name(name)
                        .ok_or_else(|| GraphError::UnknownNode(name.clone()))?;
                    graph.add_root(id)?;
                }
            }
            None => {
                for id in graph.find_roots() {
                    graph.add_root(id)?;
                }
            }
        }
        Ok(graph)
    }

    /// Builds the subgraph made of the given edges (ids in `triples()` order).
    ///
    /// Node names and labels are kept; roots are recomputed.
    pub fn subgraph<I>(&self, edges: I) -> GraphResult<Self>
    where
        I: IntoIterator<Item = EdgeId>,
    {
        let triples = self.triples();
        let mut named = Vec::new();
        let mut labels = BTreeMap::new();
        for edge in edges {
            let t = triples.get(edge.index()).ok_or_else(|| GraphError::Syntax {
                offset: 0,
                message: format!("edge {} out of range", edge.as_u32()),
            })?;
            for &n in std::iter::once(&t.source).chain(&t.tails) {
                if let Some(label) = self.node_label(n) {
                    labels.insert(self.node_name(n).to_string(), label.to_string());
                }
            }
            named.push((
                self.node_name(t.source).to_string(),
                t.label.clone(),
                t.tails.iter().map(|&n| self.node_name(n).to_string()).collect(),
            ));
        }
        Self::from_triples(named, &labels, None)
    }

    // ---- construction -------------------------------------------------

    /// Returns the node called `name`, creating it if needed.
    ///
    /// A label is only set if the node does not have one yet.
    pub fn add_node(&mut self, name: &str, label: Option<&str>) -> NodeId {
        if let Some(&id) = self.names.get(name) {
            if let (Some(label), Some(data)) = (label, self.nodes.get_mut(id)) {
                if data.label.is_none() {
                    data.label = Some(label.to_string());
                }
            }
            return id;
        }
        let id = self.allocate(name.to_string(), label.map(str::to_string));
        self.names.insert(name.to_string(), id);
        id
    }

    /// Allocates a node without a name; `name_anonymous_nodes` must run
    /// before the graph is handed out.
    pub(crate) fn add_anonymous_node(&mut self, label: Option<&str>) -> NodeId {
        self.allocate(String::new(), label.map(str::to_string))
    }

    /// Gives every unnamed node a fresh `_<k>` name.
    pub(crate) fn name_anonymous_nodes(&mut self) {
        let mut counter = 0usize;
        let unnamed: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, d)| d.name.is_empty())
            .map(|(id, _)| id)
            .collect();
        for id in unnamed {
            let mut name = format!("_{counter}");
            while self.names.contains_key(&name) {
                counter += 1;
                name = format!("_{counter}");
            }
            counter += 1;
            if let Some(data) = self.nodes.get_mut(id) {
                data.name = name.clone();
            }
            self.names.insert(name, id);
        }
    }

    fn allocate(&mut self, name: String, label: Option<String>) -> NodeId {
        self.out_edges.push(Vec::new());
        self.in_degree.push(0);
        self.ordered = OnceLock::new();
        self.nodes.allocate(NodeData { name, label })
    }

    fn check(&self, id: NodeId) -> GraphResult<()> {
        if self.nodes.contains(id) {
            Ok(())
        } else {
            Err(GraphError::InvalidNode(id))
        }
    }

    /// Sets or replaces the label of a node.
    pub fn set_node_label(&mut self, id: NodeId, label: Option<String>) -> GraphResult<()> {
        let data = self.nodes.get_mut(id).ok_or(GraphError::InvalidNode(id))?;
        data.label = label;
        Ok(())
    }

    /// Appends a hyperedge.
    pub fn add_edge(&mut self, source: NodeId, label: EdgeLabel, tails: Vec<NodeId>) -> GraphResult<()> {
        self.check(source)?;
        for &t in &tails {
            self.check(t)?;
        }
        for &t in &tails {
            self.in_degree[t.index()] += 1;
        }
        self.out_edges[source.index()].push(self.edges.len());
        self.edges.push(Triple { source, label, tails });
        self.ordered = OnceLock::new();
        Ok(())
    }

    /// Marks a node as root (no-op if it already is one).
    pub fn add_root(&mut self, id: NodeId) -> GraphResult<()> {
        self.check(id)?;
        if !self.roots.contains(&id) {
            self.roots.push(id);
            self.ordered = OnceLock::new();
        }
        Ok(())
    }

    /// Marks a node as external with the given rank.
    ///
    /// A node that held the rank before loses it.
    pub fn set_external(&mut self, id: NodeId, rank: u32) -> GraphResult<()> {
        self.check(id)?;
        if let Some(old_node) = self.rev_external.insert(rank, id) {
            if old_node != id {
                self.external.remove(&old_node);
            }
        }
        if let Some(old_rank) = self.external.insert(id, rank) {
            if old_rank != rank {
                self.rev_external.remove(&old_rank);
            }
        }
        Ok(())
    }

    /// Drops the memoized triple order; the next `triples()` recomputes it.
    pub fn refresh(&mut self) {
        self.ordered = OnceLock::new();
    }

    // ---- queries --------------------------------------------------------

    /// Number of nodes.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All node ids in allocation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.ids()
    }

    /// Name of a node; empty for ids of another graph.
    pub fn node_name(&self, id: NodeId) -> &str {
        self.nodes.get(id).map_or("", |d| d.name.as_str())
    }

    /// Node label (concept), if any.
    pub fn node_label(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id).and_then(|d| d.label.as_deref())
    }

    /// Looks a node up by name.
    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Roots in declaration order.
    #[inline]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// First root, if any.
    #[inline]
    pub fn root(&self) -> Option<NodeId> {
        self.roots.first().copied()
    }

    /// External nodes with their ranks.
    #[inline]
    pub fn external_nodes(&self) -> &BTreeMap<NodeId, u32> {
        &self.external
    }

    /// Rank of an external node.
    #[inline]
    pub fn external_rank(&self, id: NodeId) -> Option<u32> {
        self.external.get(&id).copied()
    }

    /// External node holding `rank`.
    #[inline]
    pub fn external_at(&self, rank: u32) -> Option<NodeId> {
        self.rev_external.get(&rank).copied()
    }

    /// External nodes ordered by rank.
    pub fn externals_by_rank(&self) -> impl Iterator<Item = (u32, NodeId)> + '_ {
        self.rev_external.iter().map(|(&r, &n)| (r, n))
    }

    /// Number of external nodes.
    #[inline]
    pub fn external_count(&self) -> usize {
        self.external.len()
    }

    /// Outgoing edges of a node in insertion order.
    pub fn out_edges(&self, id: NodeId) -> impl Iterator<Item = &Triple> + '_ {
        self.out_edges
            .get(id.index())
            .into_iter()
            .flatten()
            .map(move |&e| &self.edges[e])
    }

    /// Number of edges that have `id` among their tails.
    pub fn in_degree(&self, id: NodeId) -> usize {
        self.in_degree.get(id.index()).copied().unwrap_or(0)
    }

    /// Memoized edges in deterministic breadth-first order.
    pub fn triples(&self) -> &[Triple] {
        self.ordered.get_or_init(|| self.compute_triples())
    }

    /// Edge at position `id` of `triples()`.
    pub fn triple(&self, id: EdgeId) -> Option<&Triple> {
        self.triples().get(id.index())
    }

    /// `triples()` with node labels attached to every endpoint.
    pub fn labeled_triples(&self) -> Vec<LabeledTriple<'_>> {
        self.triples()
            .iter()
            .map(|t| LabeledTriple {
                source: (t.source, self.node_label(t.source)),
                label: &t.label,
                tails: t.tails.iter().map(|&n| (n, self.node_label(n))).collect(),
            })
            .collect()
    }

    fn compute_triples(&self) -> Vec<Triple> {
        let mut order = Vec::with_capacity(self.edges.len());
        let mut seen = vec![false; self.nodes.len()];
        let mut queue = VecDeque::new();
        let seeds: Vec<NodeId> = self.roots.iter().copied().chain(self.nodes.ids()).collect();
        for seed in seeds {
            if seen[seed.index()] {
                continue;
            }
            seen[seed.index()] = true;
            queue.push_back(seed);
            while let Some(node) = queue.pop_front() {
                let mut outgoing: Vec<(String, usize)> = self.out_edges[node.index()]
                    .iter()
                    .map(|&e| (self.edges[e].label.to_string(), e))
                    .collect();
                outgoing.sort_by(|a, b| a.0.cmp(&b.0));
                for (_, e) in outgoing {
                    let triple = &self.edges[e];
                    for &tail in &triple.tails {
                        if !seen[tail.index()] {
                            seen[tail.index()] = true;
                            queue.push_back(tail);
                        }
                    }
                    order.push(triple.clone());
                }
            }
        }
        order
    }

    /// Structural hash (see [`crate::fingerprint::structural_hash`]).
    pub fn structural_hash(&self) -> u64 {
        structural_hash(self)
    }

    /// Ids of nonterminal edges in `triples()` order.
    pub fn nonterminal_edges(&self) -> Vec<EdgeId> {
        self.triples()
            .iter()
            .enumerate()
            .filter(|(_, t)| t.label.is_nonterminal())
            .map(|(i, _)| EdgeId::new(i as u32))
            .collect()
    }

    /// Splits edge labels into terminal keys and nonterminal labels.
    pub fn get_terminals_and_nonterminals(
        &self,
        node_labels: bool,
    ) -> (BTreeSet<TerminalKey>, BTreeSet<NonterminalLabel>) {
        let mut terminals = BTreeSet::new();
        let mut nonterminals = BTreeSet::new();
        for t in self.triples() {
            match &t.label {
                EdgeLabel::Nonterminal(nt) => {
                    nonterminals.insert(nt.clone());
                }
                EdgeLabel::Terminal(label) => {
                    let key = if node_labels {
                        TerminalKey {
                            label: label.clone(),
                            source_label: self.node_label(t.source).map(str::to_string),
                            tail_labels: t
                                .tails
                                .iter()
                                .map(|&n| self.node_label(n).map(str::to_string))
                                .collect(),
                        }
                    } else {
                        TerminalKey {
                            label: label.clone(),
                            source_label: None,
                            tail_labels: Vec::new(),
                        }
                    };
                    terminals.insert(key);
                }
            }
        }
        (terminals, nonterminals)
    }

    /// Nodes reachable from `start` along edge direction, `start` included.
    pub fn reach(&self, start: NodeId) -> BTreeSet<NodeId> {
        let mut reached = BTreeSet::new();
        if !self.nodes.contains(start) {
            return reached;
        }
        let mut stack = vec![start];
        reached.insert(start);
        while let Some(node) = stack.pop() {
            for t in self.out_edges(node) {
                for &tail in &t.tails {
                    if reached.insert(tail) {
                        stack.push(tail);
                    }
                }
            }
        }
        reached
    }

    /// Chooses roots that together reach every node.
    ///
    /// Nodes without incoming edges come first (allocation order). While some
    /// node is still unreached, the unreached node with the largest reach is
    /// added (first in allocation order on ties).
    pub fn find_roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self.node_ids().filter(|&n| self.in_degree(n) == 0).collect();
        let mut reached: BTreeSet<NodeId> = roots.iter().flat_map(|&r| self.reach(r)).collect();
        while reached.len() < self.node_count() {
            let mut best: Option<(usize, NodeId, BTreeSet<NodeId>)> = None;
            for n in self.node_ids().filter(|n| !reached.contains(n)) {
                let r = self.reach(n);
                if best.as_ref().map_or(true, |(size, _, _)| r.len() > *size) {
                    best = Some((r.len(), n, r));
                }
            }
            match best {
                Some((_, n, r)) => {
                    roots.push(n);
                    reached.extend(r);
                }
                None => break,
            }
        }
        roots
    }

    /// Nodes that are the tail of more than one edge occurrence.
    pub fn reentrant_nodes(&self) -> BTreeSet<NodeId> {
        self.node_ids().filter(|&n| self.in_degree(n) > 1).collect()
    }

    /// Nodes without outgoing edges.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|n| self.out_edges[n.index()].is_empty())
            .collect()
    }

    /// Nodes in order of first appearance in `triples()`, then isolated nodes.
    pub fn ordered_nodes(&self) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        let mut order = Vec::with_capacity(self.node_count());
        for t in self.triples() {
            for &n in std::iter::once(&t.source).chain(&t.tails) {
                if seen.insert(n) {
                    order.push(n);
                }
            }
        }
        for n in self.node_ids() {
            if seen.insert(n) {
                order.push(n);
            }
        }
        order
    }

    /// Serializes to the graph description format.
    ///
    /// Ids are printed for reentrant nodes and for roots with incoming edges;
    /// with `node_ids` they are printed for every node.
    pub fn to_bolinas_str(&self, node_ids: bool) -> String {
        super::description::serialize(self, node_ids)
    }

    /// `to_bolinas_str(false)` with all whitespace runs collapsed to one space.
    pub fn to_single_line(&self) -> String {
        self.to_bolinas_str(false)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl PartialEq for Hypergraph {
    fn eq(&self, other: &Self) -> bool {
        self.structural_hash() == other.structural_hash()
    }
}

impl Eq for Hypergraph {}

impl Hash for Hypergraph {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.structural_hash());
    }
}

impl fmt::Display for Hypergraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bolinas_str(false))
    }
}
