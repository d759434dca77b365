//! Derivation trees and walkers over them.
//!
//! A derivation is either a leaf item (a rule with no nonterminal children in
//! the chart) or a node: a chart key together with one subderivation per
//! nonterminal slot of its rule. Derivations produced from START have a
//! single `START` child holding the accepted item's derivation.

use crate::chart::{ChartKey, Slot};
use crate::error::{DerivationError, GraphResult};
use crate::grammar::RuleId;
use crate::graph::{Hypergraph, NodeId};
use crate::item::ItemRef;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

/// A derivation tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Derivation {
    /// An item without expansions.
    Leaf(ItemRef),
    /// An expanded chart key.
    Node {
        /// The expanded key.
        key: ChartKey,
        /// Subderivation per nonterminal slot.
        children: BTreeMap<Slot, Arc<Derivation>>,
    },
}

/// A derivation with its log-probability.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDerivation {
    /// Sum of the weights of all rules used.
    pub score: f64,
    /// The tree.
    pub derivation: Arc<Derivation>,
}

impl Derivation {
    /// Item at the top of this tree, `None` for a START node.
    pub fn item(&self) -> Option<&ItemRef> {
        match self {
            Self::Leaf(item) => Some(item),
            Self::Node { key, .. } => key.item(),
        }
    }

    /// Child derivations, empty for a leaf.
    pub fn children(&self) -> impl Iterator<Item = (&Slot, &Arc<Derivation>)> {
        let children = match self {
            Self::Leaf(_) => None,
            Self::Node { children, .. } => Some(children),
        };
        children.into_iter().flatten()
    }

    /// The accepted item: the child under START, or the top item otherwise.
    pub fn final_item(&self) -> Option<&ItemRef> {
        match self {
            Self::Node {
                key: ChartKey::Start,
                children,
            } => children.get(&Slot::Start).and_then(|child| child.item()),
            other => other.item(),
        }
    }

    /// Items of the tree in pre-order, START excluded.
    pub fn items(&self) -> Vec<&ItemRef> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Some(item) = node.item() {
                out.push(item);
            }
            let children: Vec<&Derivation> = node.children().map(|(_, c)| c.as_ref()).collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Renders the tree as `rule_id(SYM$idx(child) ...)`; leaves are bare
    /// rule ids and START is transparent.
    pub fn format(&self) -> String {
        match self {
            Self::Leaf(item) => item.rule_id().to_string(),
            Self::Node {
                key: ChartKey::Start,
                children,
            } => children
                .get(&Slot::Start)
                .map(|child| child.format())
                .unwrap_or_default(),
            Self::Node {
                key: ChartKey::Item(item),
                children,
            } => {
                let parts: Vec<String> = children
                    .iter()
                    .map(|(slot, child)| format!("{slot}({})", child.format()))
                    .collect();
                format!("{}({})", item.rule_id(), parts.join(" "))
            }
        }
    }

    /// How often each rule is used.
    pub fn used_rules(&self) -> BTreeMap<RuleId, usize> {
        let mut counts = BTreeMap::new();
        for item in self.items() {
            *counts.entry(item.rule_id()).or_insert(0) += 1;
        }
        counts
    }

    /// Input nodes covered by the accepted item.
    pub fn matched_nodes(&self) -> BTreeSet<NodeId> {
        self.final_item()
            .map(|item| item.nodeset().clone())
            .unwrap_or_default()
    }

    /// The input edges consumed by the accepted item, as a graph.
    pub fn shifted_graph(&self, input: &Hypergraph) -> GraphResult<Option<Hypergraph>> {
        let Some(item) = self.final_item() else {
            return Ok(None);
        };
        input.subgraph(item.shifted().iter().copied()).map(Some)
    }

    /// [`Derivation::shifted_graph`] on one line, with every node id printed.
    pub fn print_shifted(&self, input: &Hypergraph) -> GraphResult<String> {
        Ok(self
            .shifted_graph(input)?
            .map(|graph| {
                graph
                    .to_bolinas_str(true)
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default())
    }

    /// Labels input nodes with the symbols of the rules that introduced them.
    ///
    /// Every item labels the input node bound to its rule's external node of
    /// rank 0 with the rule's symbol. Items whose symbol is `skip_symbol` are
    /// left out. Two different symbols on one node is an error.
    pub fn node_labels(
        &self,
        input: &Hypergraph,
        skip_symbol: Option<&str>,
    ) -> Result<BTreeMap<NodeId, String>, DerivationError> {
        let mut labels: BTreeMap<NodeId, String> = BTreeMap::new();
        for item in self.items() {
            if skip_symbol == Some(item.symbol()) {
                continue;
            }
            let rule_graph = item.rule().rhs1.graph();
            let Some(node) = rule_graph
                .external_at(0)
                .and_then(|ext| item.mapping().get(&ext).copied())
            else {
                continue;
            };
            match labels.get(&node) {
                Some(existing) if existing != item.symbol() => {
                    return Err(DerivationError::ConflictingLabel {
                        node: input.node_name(node).to_string(),
                        existing: existing.clone(),
                        new: item.symbol().to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    labels.insert(node, item.symbol().to_string());
                }
            }
        }
        Ok(labels)
    }
}

/// Keeps the first derivation per distinct set of covered input nodes, up to
/// `k` derivations.
pub fn k_best_unique(derivations: &[ScoredDerivation], k: usize) -> Vec<ScoredDerivation> {
    let mut seen: HashSet<BTreeSet<NodeId>> = HashSet::new();
    let mut out = Vec::new();
    for scored in derivations {
        if out.len() >= k {
            break;
        }
        if seen.insert(scored.derivation.matched_nodes()) {
            out.push(scored.clone());
        }
    }
    if out.len() < k {
        tracing::debug!(found = out.len(), requested = k, "fewer unique derivations than requested");
    }
    out
}

/// Node labelings of the given derivations, best first.
///
/// Derivations that label a node twice are skipped. Search with
/// [`CkyChart::labelled_derivations`](crate::chart::CkyChart::labelled_derivations)
/// to keep them from taking a place among the k best in the first place.
pub fn labelings(
    derivations: &[ScoredDerivation],
    input: &Hypergraph,
    skip_symbol: Option<&str>,
) -> Vec<(f64, BTreeMap<NodeId, String>)> {
    let mut out = Vec::with_capacity(derivations.len());
    for scored in derivations {
        match scored.derivation.node_labels(input, skip_symbol) {
            Ok(labels) => out.push((scored.score, labels)),
            Err(err) => tracing::warn!(%err, "skipping derivation"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::kbest::SearchConfig;
    use crate::grammar::{Grammar, GrammarOptions};
    use crate::parser::Parser;

    const GRAMMAR: &str = "\
S -> (. :A$1 .*0 :B$2 .*1) ; 0.5
A -> (. :a .*0) ;
B -> (. :b .*0) ;
";

    fn best(grammar: &str, input: &Hypergraph) -> ScoredDerivation {
        let g = Grammar::load_from_str(grammar, GrammarOptions::default()).unwrap();
        let (chart, _) = Parser::new(&g).parse_to_cky(input).unwrap();
        chart
            .derivations(&SearchConfig::default())
            .derivations
            .into_iter()
            .next()
            .unwrap()
    }

    #[test]
    fn format_and_rule_counts() {
        let input = Hypergraph::from_string("(x. :a y. :b z.)").unwrap();
        let d = best(GRAMMAR, &input);
        assert_eq!(d.derivation.format(), "1(A$1(2) B$2(3))");
        assert!((d.score - 0.5f64.ln()).abs() < 1e-12);
        let used: Vec<(u32, usize)> = d
            .derivation
            .used_rules()
            .into_iter()
            .map(|(id, n)| (id.as_u32(), n))
            .collect();
        assert_eq!(used, vec![(1, 1), (2, 1), (3, 1)]);
        assert_eq!(d.derivation.final_item().unwrap().symbol(), "S");
        assert_eq!(d.derivation.matched_nodes().len(), 3);
    }

    #[test]
    fn shifted_graph_is_the_covered_part() {
        let input = Hypergraph::from_string("(x. :a y. :b z.)").unwrap();
        let d = best(GRAMMAR, &input);
        let shifted = d.derivation.shifted_graph(&input).unwrap().unwrap();
        assert_eq!(shifted, input);
        assert_eq!(d.derivation.print_shifted(&input).unwrap(), "(x. :a y. :b z.)");
    }

    #[test]
    fn node_labels_and_conflicts() {
        let input = Hypergraph::from_string("(x. :a y. :b z.)").unwrap();
        let d = best(GRAMMAR, &input);
        let labels = d.derivation.node_labels(&input, Some("S")).unwrap();
        let named: Vec<(&str, &str)> = labels
            .iter()
            .map(|(&n, s)| (input.node_name(n), s.as_str()))
            .collect();
        assert_eq!(named, vec![("y", "A"), ("z", "B")]);

        // Both children put their external node 0 on the same input node.
        let clash = "\
S -> (. :A$1 n.*0 :B$2 n.) ;
A -> (. :a .*0) ;
B -> (. :b .*0) ;
";
        let input = Hypergraph::from_string("(x. :a y. :b y.)").unwrap();
        let d = best(clash, &input);
        assert!(matches!(
            d.derivation.node_labels(&input, Some("S")),
            Err(DerivationError::ConflictingLabel { .. })
        ));
        assert!(labelings(&[d], &input, Some("S")).is_empty());
    }

    #[test]
    fn unique_by_covered_nodes() {
        let input = Hypergraph::from_string("(x. :a y.)").unwrap();
        let text = "S -> (. :A$1 .*0) ; 0.9\nS -> (. :a .*0) ; 0.1\nA -> (. :a .*0) ;\n";
        let g = Grammar::load_from_str(text, GrammarOptions::default()).unwrap();
        let (chart, _) = Parser::new(&g).parse_to_cky(&input).unwrap();
        let all = chart
            .derivations(&SearchConfig::default().with_k_best(None))
            .derivations;
        assert_eq!(all.len(), 2);
        let unique = k_best_unique(&all, 5);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].derivation.format(), "1(A$1(3))");
    }
}
