//! Chart items: partial matches of one rule against the input graph.
//!
//! An item records how far the rule's visit order has been consumed
//! (`size`), which input edges were consumed (`shifted`), and how rule nodes
//! were bound to input nodes (`mapping`, with its inverse). The next rule
//! edge to consume is the *outside* edge. A terminal outside edge is consumed
//! by `shift`ing a matching input edge; a nonterminal one by `complete`-ing a
//! closed item of the right symbol.
//!
//! # Invariants
//! - `closed() == outside_triple().is_none()`.
//! - `size <= rule.len()`.
//! - `shifted` is sorted and duplicate free.
//! - `mapping` is injective and `rev_mapping` is its inverse.
//! - Items are never mutated; transitions return new items.
//!
//! Items hash by `(rule_id, size, shifted)` and compare equal on
//! `(rule_id, size, shifted, mapping)`.

use crate::fingerprint::HashValue;
use crate::grammar::{Rule, RuleId};
use crate::graph::{EdgeId, EdgeLabel, Hypergraph, NodeId, NonterminalLabel, Triple};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Shared handle to an item; the chart, agenda and derivations all hold these.
pub type ItemRef = Arc<HergItem>;

/// A chart item for hyperedge replacement grammar parsing.
#[derive(Debug, Clone)]
pub struct HergItem {
    rule: Arc<Rule>,
    size: usize,
    shifted: Vec<EdgeId>,
    mapping: BTreeMap<NodeId, NodeId>,
    rev_mapping: BTreeMap<NodeId, NodeId>,
    nodeset: BTreeSet<NodeId>,
    node_labels: bool,
}

impl HergItem {
    /// The empty item of a rule: nothing consumed, nothing bound.
    pub fn axiom(rule: Arc<Rule>, node_labels: bool) -> Self {
        Self {
            rule,
            size: 0,
            shifted: Vec::new(),
            mapping: BTreeMap::new(),
            rev_mapping: BTreeMap::new(),
            nodeset: BTreeSet::new(),
            node_labels,
        }
    }

    /// Rebuilds an item from stored parts.
    ///
    /// Returns `None` if the parts cannot describe an item of `rule`: `size`
    /// beyond the rule length, or a mapping that is not injective.
    pub fn from_parts(
        rule: Arc<Rule>,
        size: usize,
        mut shifted: Vec<EdgeId>,
        mapping: BTreeMap<NodeId, NodeId>,
        nodeset: BTreeSet<NodeId>,
        node_labels: bool,
    ) -> Option<Self> {
        if size > rule.len() {
            return None;
        }
        shifted.sort_unstable();
        shifted.dedup();
        let rev_mapping: BTreeMap<NodeId, NodeId> = mapping.iter().map(|(&k, &v)| (v, k)).collect();
        if rev_mapping.len() != mapping.len() {
            return None;
        }
        Some(Self {
            rule,
            size,
            shifted,
            mapping,
            rev_mapping,
            nodeset,
            node_labels,
        })
    }

    /// The rule this item instantiates.
    #[inline]
    pub fn rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    /// Shorthand for `rule().rule_id`.
    #[inline]
    pub fn rule_id(&self) -> RuleId {
        self.rule.rule_id
    }

    /// LHS symbol of the rule.
    #[inline]
    pub fn symbol(&self) -> &str {
        &self.rule.symbol
    }

    /// Number of rule edges consumed.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Consumed input edges, sorted.
    #[inline]
    pub fn shifted(&self) -> &[EdgeId] {
        &self.shifted
    }

    /// Rule node to input node bindings.
    #[inline]
    pub fn mapping(&self) -> &BTreeMap<NodeId, NodeId> {
        &self.mapping
    }

    /// Input node to rule node bindings.
    #[inline]
    pub fn rev_mapping(&self) -> &BTreeMap<NodeId, NodeId> {
        &self.rev_mapping
    }

    /// Input nodes touched by this item or any item completed into it.
    #[inline]
    pub fn nodeset(&self) -> &BTreeSet<NodeId> {
        &self.nodeset
    }

    /// Whether node labels are compared.
    #[inline]
    pub fn node_labels(&self) -> bool {
        self.node_labels
    }

    /// All rule edges have been consumed.
    #[inline]
    pub fn closed(&self) -> bool {
        self.size >= self.rule.len()
    }

    /// The rule edge to be consumed next.
    pub fn outside_triple(&self) -> Option<&Triple> {
        let position = *self.rule.rhs1_visit_order.get(self.size)?;
        self.rule.rhs1.graph().triples().get(position)
    }

    /// `true` if the outside edge is a nonterminal.
    pub fn outside_is_nonterminal(&self) -> bool {
        self.outside_triple()
            .is_some_and(|t| t.label.is_nonterminal())
    }

    /// Label of a nonterminal outside edge.
    pub fn outside_nonterminal(&self) -> Option<&NonterminalLabel> {
        self.outside_triple().and_then(|t| t.label.as_nonterminal())
    }

    /// Symbol of a nonterminal outside edge.
    pub fn outside_symbol(&self) -> Option<&str> {
        self.outside_nonterminal().map(|nt| nt.symbol.as_str())
    }

    fn rule_graph(&self) -> &Hypergraph {
        self.rule.rhs1.graph()
    }

    /// Checks one rule-node/input-node pair against the current bindings.
    fn binding_ok(&self, rule_node: NodeId, input_node: NodeId) -> bool {
        if let Some(&bound) = self.mapping.get(&rule_node) {
            if bound != input_node {
                return false;
            }
        }
        match self.rev_mapping.get(&input_node) {
            Some(&owner) => owner == rule_node,
            // A node that belongs to a completed sub-item but is not bound
            // by this rule cannot be taken over.
            None => !self.nodeset.contains(&input_node),
        }
    }

    /// Whether input edge `edge` of `graph` can be consumed as the outside edge.
    pub fn can_shift(&self, graph: &Hypergraph, edge: EdgeId) -> bool {
        let Some(outside) = self.outside_triple() else {
            return false;
        };
        if self.shifted.binary_search(&edge).is_ok() {
            return false;
        }
        let Some(candidate) = graph.triple(edge) else {
            return false;
        };
        if outside.label != candidate.label || outside.tails.len() != candidate.tails.len() {
            return false;
        }
        let rule_graph = self.rule_graph();
        if self.node_labels {
            if rule_graph.node_label(outside.source) != graph.node_label(candidate.source) {
                return false;
            }
            let tails_agree = outside
                .tails
                .iter()
                .zip(&candidate.tails)
                .all(|(&o, &n)| rule_graph.node_label(o) == graph.node_label(n));
            if !tails_agree {
                return false;
            }
        }
        let pairs = attachment_pairs(outside, candidate.source, &candidate.tails);
        pairs.iter().all(|&(o, n)| self.binding_ok(o, n)) && one_to_one(&pairs)
    }

    /// Consumes `edge` as the outside edge.
    ///
    /// Callers check [`HergItem::can_shift`] first; `None` is only returned
    /// when the item is closed or the edge id is out of range.
    pub fn shift(&self, graph: &Hypergraph, edge: EdgeId) -> Option<Self> {
        let outside = self.outside_triple()?;
        let candidate = graph.triple(edge)?;
        let mut next = self.clone();
        next.size += 1;
        if let Err(pos) = next.shifted.binary_search(&edge) {
            next.shifted.insert(pos, edge);
        }
        next.bind(outside.source, candidate.source);
        for (&o, &n) in outside.tails.iter().zip(&candidate.tails) {
            next.bind(o, n);
        }
        next.nodeset.insert(candidate.source);
        next.nodeset.extend(candidate.tails.iter().copied());
        Some(next)
    }

    fn bind(&mut self, rule_node: NodeId, input_node: NodeId) {
        if let Some(old) = self.mapping.insert(rule_node, input_node) {
            self.rev_mapping.remove(&old);
        }
        self.rev_mapping.insert(input_node, rule_node);
    }

    /// Input nodes `other` provides for this item's outside edge: its root
    /// image followed by its external images in rank order.
    fn attachment_images(&self, other: &HergItem) -> Option<(NodeId, Vec<NodeId>)> {
        let outside = self.outside_triple()?;
        let other_graph = other.rule_graph();
        if other_graph.external_count() != outside.tails.len() {
            return None;
        }
        let root = other_graph.root()?;
        let root_image = *other.mapping.get(&root)?;
        let tail_images = (0..outside.tails.len())
            .map(|rank| {
                let ext = other_graph.external_at(rank as u32)?;
                other.mapping.get(&ext).copied()
            })
            .collect::<Option<Vec<_>>>()?;
        Some((root_image, tail_images))
    }

    /// Whether the closed item `other` can fill the nonterminal outside edge.
    pub fn can_complete(&self, other: &HergItem) -> bool {
        if self.closed() || !other.closed() {
            return false;
        }
        let Some(outside) = self.outside_triple() else {
            return false;
        };
        let EdgeLabel::Nonterminal(expected) = &outside.label else {
            return false;
        };
        if other.symbol() != expected.symbol {
            return false;
        }
        if other
            .shifted
            .iter()
            .any(|e| self.shifted.binary_search(e).is_ok())
        {
            return false;
        }
        let Some((root_image, tail_images)) = self.attachment_images(other) else {
            return false;
        };

        let rule_graph = self.rule_graph();
        let other_graph = other.rule_graph();
        if self.node_labels {
            let Some(other_root) = other_graph.root() else {
                return false;
            };
            if rule_graph.node_label(outside.source) != other_graph.node_label(other_root) {
                return false;
            }
            for (rank, &tail) in outside.tails.iter().enumerate() {
                let ext = other_graph.external_at(rank as u32);
                if rule_graph.node_label(tail) != ext.and_then(|n| other_graph.node_label(n)) {
                    return false;
                }
            }
        }

        if self
            .mapping
            .get(&outside.source)
            .is_some_and(|&bound| bound != root_image)
        {
            return false;
        }
        for (&tail, &image) in outside.tails.iter().zip(&tail_images) {
            if self.mapping.get(&tail).is_some_and(|&bound| bound != image) {
                return false;
            }
        }
        if !one_to_one(&attachment_pairs(outside, root_image, &tail_images)) {
            return false;
        }

        // Input nodes bound by this rule may only be reused by `other` at
        // the attachment points of the outside edge.
        other.mapping.values().all(|node| match self.rev_mapping.get(node) {
            Some(owner) => *owner == outside.source || outside.tails.contains(owner),
            None => true,
        })
    }

    /// Fills the outside edge with `other`.
    ///
    /// Callers check [`HergItem::can_complete`] first.
    pub fn complete(&self, other: &HergItem) -> Option<Self> {
        let outside = self.outside_triple()?;
        let (root_image, tail_images) = self.attachment_images(other)?;
        let mut next = self.clone();
        next.size += 1;
        next.shifted.extend_from_slice(&other.shifted);
        next.shifted.sort_unstable();
        next.shifted.dedup();
        next.bind(outside.source, root_image);
        for (&tail, &image) in outside.tails.iter().zip(&tail_images) {
            next.bind(tail, image);
        }
        next.nodeset.extend(other.nodeset.iter().copied());
        Some(next)
    }

    /// Domain-separated digest of `(rule_id, size, shifted, mapping)`.
    pub fn fingerprint(&self) -> HashValue {
        let mut data = Vec::new();
        data.extend_from_slice(&self.rule.rule_id.as_u32().to_le_bytes());
        data.extend_from_slice(&(self.size as u64).to_le_bytes());
        data.extend_from_slice(&(self.shifted.len() as u64).to_le_bytes());
        for edge in &self.shifted {
            data.extend_from_slice(&edge.as_u32().to_le_bytes());
        }
        data.extend_from_slice(&(self.mapping.len() as u64).to_le_bytes());
        for (k, v) in &self.mapping {
            data.extend_from_slice(&k.as_u32().to_le_bytes());
            data.extend_from_slice(&v.as_u32().to_le_bytes());
        }
        HashValue::hash_with_domain(b"CHART_ITEM", &data)
    }
}

/// Rule-node/input-node pairs for attaching `outside` at `source` and `tails`.
fn attachment_pairs(outside: &Triple, source: NodeId, tails: &[NodeId]) -> Vec<(NodeId, NodeId)> {
    std::iter::once((outside.source, source))
        .chain(outside.tails.iter().copied().zip(tails.iter().copied()))
        .collect()
}

/// `true` if no rule node gets two input nodes and no input node two rule
/// nodes among `pairs`.
fn one_to_one(pairs: &[(NodeId, NodeId)]) -> bool {
    let mut forward = BTreeMap::new();
    let mut backward = BTreeMap::new();
    pairs.iter().all(|&(rule_node, input_node)| {
        *forward.entry(rule_node).or_insert(input_node) == input_node
            && *backward.entry(input_node).or_insert(rule_node) == rule_node
    })
}

impl PartialEq for HergItem {
    fn eq(&self, other: &Self) -> bool {
        self.rule.rule_id == other.rule.rule_id
            && self.size == other.size
            && self.shifted == other.shifted
            && self.mapping == other.mapping
    }
}

impl Eq for HergItem {}

impl Hash for HergItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rule.rule_id.hash(state);
        self.size.hash(state);
        self.shifted.hash(state);
    }
}

impl fmt::Display for HergItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shifted: Vec<String> = self.shifted.iter().map(|e| e.as_u32().to_string()).collect();
        write!(
            f,
            "[{}, {}/{}, {}, {{{}}}]",
            self.rule.rule_id,
            self.size,
            self.rule.len(),
            self.outside_symbol().unwrap_or("-"),
            shifted.join(",")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Rhs;

    fn rule(id: u32, symbol: &str, rhs: &str) -> Arc<Rule> {
        let graph = Hypergraph::from_string(rhs).unwrap();
        Arc::new(Rule::new(RuleId::new(id), symbol, 0.0, Rhs::graph_rhs(graph), None).unwrap())
    }

    fn edge_with_label(graph: &Hypergraph, label: &str) -> EdgeId {
        let pos = graph
            .triples()
            .iter()
            .position(|t| t.label.to_string() == label)
            .unwrap();
        EdgeId::new(pos as u32)
    }

    #[test]
    fn axiom_invariants() {
        let r = rule(1, "A", "(. :a .*0 :b .)");
        let item = HergItem::axiom(r.clone(), false);
        assert_eq!(item.size(), 0);
        assert!(!item.closed());
        assert!(item.outside_triple().is_some());
        assert!(!item.outside_is_nonterminal());

        let empty = rule(2, "E", "(.)");
        let closed = HergItem::axiom(empty, false);
        assert!(closed.closed());
        assert!(closed.outside_triple().is_none());
    }

    #[test]
    fn shift_extends_mapping_and_shifted() {
        let input = Hypergraph::from_string("(x. :a y. :b z.)").unwrap();
        let r = rule(1, "A", "(. :a .*0 :b .)");
        let item = HergItem::axiom(r, false);
        let a = edge_with_label(&input, "a");
        let b = edge_with_label(&input, "b");
        assert!(!item.can_shift(&input, b), "label mismatch");
        assert!(item.can_shift(&input, a));

        let one = item.shift(&input, a).unwrap();
        assert_eq!(one.size(), 1);
        assert_eq!(one.shifted(), &[a]);
        assert_eq!(one.nodeset().len(), 2);
        assert!(!one.can_shift(&input, a), "already shifted");

        let two = one.shift(&input, b).unwrap();
        assert!(two.closed());
        assert_eq!(two.shifted().len(), two.size());
        assert_eq!(two.mapping().len(), 3);
        assert_eq!(two.rev_mapping().len(), 3);
        // the source item is untouched
        assert_eq!(item.size(), 0);
    }

    #[test]
    fn shift_rejects_inconsistent_source() {
        // Both rule edges leave the same rule node, but the input edges do not
        // share a source.
        let input = Hypergraph::from_string("(x. :a y.) (p. :b q.)").unwrap();
        let r = rule(1, "A", "(. :a .*0 :b .)");
        let a = edge_with_label(&input, "a");
        let b = edge_with_label(&input, "b");
        let one = HergItem::axiom(r, false).shift(&input, a).unwrap();
        assert!(!one.can_shift(&input, b));
    }

    #[test]
    fn shift_keeps_mapping_injective_within_one_edge() {
        // Two distinct rule tails cannot land on the same input node.
        let input = Hypergraph::from_string("(r. :rel a. a.)").unwrap();
        let r = rule(1, "S", "(. :rel .*0 .*1)");
        assert!(!HergItem::axiom(r, false).can_shift(&input, EdgeId::new(0)));

        // A rule edge that repeats a node needs the input edge to repeat it too.
        let looped = rule(2, "S", "(n. :rel .*0 n.)");
        let distinct = Hypergraph::from_string("(r. :rel a. b.)").unwrap();
        assert!(!HergItem::axiom(looped.clone(), false).can_shift(&distinct, EdgeId::new(0)));
        let self_loop = Hypergraph::from_string("(r. :rel a. r.)").unwrap();
        let item = HergItem::axiom(looped, false);
        assert!(item.can_shift(&self_loop, EdgeId::new(0)));
        let shifted = item.shift(&self_loop, EdgeId::new(0)).unwrap();
        assert_eq!(shifted.mapping().len(), shifted.rev_mapping().len());
    }

    #[test]
    fn shift_respects_node_labels() {
        let input = Hypergraph::from_string("(x.dog :bark y.)").unwrap();
        let e = EdgeId::new(0);
        let cat = rule(1, "A", "(.cat :bark .*0)");
        let dog = rule(2, "A", "(.dog :bark .*0)");
        assert!(HergItem::axiom(cat.clone(), false).can_shift(&input, e));
        assert!(!HergItem::axiom(cat, true).can_shift(&input, e));
        assert!(HergItem::axiom(dog, true).can_shift(&input, e));
    }

    #[test]
    fn complete_binds_root_and_externals() {
        let input = Hypergraph::from_string("(x. :a y.)").unwrap();
        let parent = rule(1, "S", "(. :A$1 .*0)");
        let child = rule(2, "A", "(. :a .*0)");
        let a = EdgeId::new(0);
        let closed_child = HergItem::axiom(child, false).shift(&input, a).unwrap();
        assert!(closed_child.closed());

        let waiting = HergItem::axiom(parent, false);
        assert!(waiting.outside_is_nonterminal());
        assert_eq!(waiting.outside_symbol(), Some("A"));
        assert!(waiting.can_complete(&closed_child));
        let done = waiting.complete(&closed_child).unwrap();
        assert!(done.closed());
        assert_eq!(done.shifted(), &[a]);
        let images: BTreeSet<NodeId> = done.mapping().values().copied().collect();
        assert_eq!(images, BTreeSet::from([input.node_by_name("x").unwrap(), input.node_by_name("y").unwrap()]));
        assert_eq!(done.nodeset(), closed_child.nodeset());

        // open items cannot be completed into anything
        assert!(!waiting.can_complete(&waiting));
    }

    #[test]
    fn complete_rejects_wrong_symbol_arity_and_overlap() {
        let input = Hypergraph::from_string("(x. :a y.)").unwrap();
        let a = EdgeId::new(0);
        let parent = rule(1, "S", "(. :A$1 .*0 :A$2 .*1)");
        let child_b = rule(2, "B", "(. :a .*0)");
        let child_a = rule(3, "A", "(. :a .*0)");
        let child_a2 = rule(4, "A", "(. :a .*0 .*1)");

        let waiting = HergItem::axiom(parent, false);
        let b_item = HergItem::axiom(child_b, false).shift(&input, a).unwrap();
        assert!(!waiting.can_complete(&b_item), "symbol mismatch");

        let input2 = Hypergraph::from_string("(x. :a y. z.)").unwrap();
        let a2_item = HergItem::axiom(child_a2, false).shift(&input2, a).unwrap();
        assert!(!waiting.can_complete(&a2_item), "arity mismatch");

        let a_item = HergItem::axiom(child_a, false).shift(&input, a).unwrap();
        let half = waiting.complete(&a_item).unwrap();
        assert!(!half.can_complete(&a_item), "edge already used");
    }

    #[test]
    fn equality_hash_and_fingerprint() {
        let input = Hypergraph::from_string("(x. :a y.)").unwrap();
        let r = rule(1, "A", "(. :a .*0)");
        let one = HergItem::axiom(r.clone(), false).shift(&input, EdgeId::new(0)).unwrap();
        let two = HergItem::axiom(r, false).shift(&input, EdgeId::new(0)).unwrap();
        assert_eq!(one, two);
        assert_eq!(one.fingerprint(), two.fingerprint());
        let rebuilt = HergItem::from_parts(
            one.rule().clone(),
            one.size(),
            one.shifted().to_vec(),
            one.mapping().clone(),
            one.nodeset().clone(),
            false,
        )
        .unwrap();
        assert_eq!(rebuilt, one);
        assert_eq!(one.to_string(), "[1, 1/1, -, {0}]");
    }
}
