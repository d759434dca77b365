//! Grammar rules.

use crate::error::GrammarErrorKind;
use crate::fingerprint::HashValue;
use crate::graph::{EdgeLabel, Hypergraph, NonterminalLabel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Rule identifier: the 1-based position of the rule in its grammar file.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(u32);

impl RuleId {
    /// Creates a rule id.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a right-hand side was written in the grammar file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RhsFormat {
    /// A graph description.
    Hypergraph,
    /// A whitespace separated token string.
    String,
}

/// One right-hand side of a rule.
///
/// String right-hand sides are stored as chain graphs (see
/// [`Hypergraph::from_tokens`]) so that strings and graphs go through the same
/// parser.
#[derive(Debug, Clone)]
pub struct Rhs {
    format: RhsFormat,
    graph: Hypergraph,
}

impl Rhs {
    /// Wraps a graph right-hand side.
    pub fn graph_rhs(graph: Hypergraph) -> Self {
        Self {
            format: RhsFormat::Hypergraph,
            graph,
        }
    }

    /// Wraps a token string (already turned into a chain graph).
    pub fn string_rhs(chain: Hypergraph) -> Self {
        Self {
            format: RhsFormat::String,
            graph: chain,
        }
    }

    /// Format the right-hand side was read in.
    #[inline]
    pub fn format(&self) -> RhsFormat {
        self.format
    }

    /// The fragment as a hypergraph.
    #[inline]
    pub fn graph(&self) -> &Hypergraph {
        &self.graph
    }

    /// Nonterminal labels of all nonterminal edges.
    pub fn nonterminals(&self) -> BTreeSet<NonterminalLabel> {
        self.graph
            .triples()
            .iter()
            .filter_map(|t| t.label.as_nonterminal().cloned())
            .collect()
    }
}

impl fmt::Display for Rhs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format {
            RhsFormat::Hypergraph => f.write_str(&self.graph.to_single_line()),
            RhsFormat::String => {
                let tokens: Vec<String> = self
                    .graph
                    .triples()
                    .iter()
                    .map(|t| t.label.to_string())
                    .collect();
                f.write_str(&tokens.join(" "))
            }
        }
    }
}

/// A (possibly synchronous) grammar rule.
///
/// Identity is by `rule_id` only.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Rule id.
    pub rule_id: RuleId,
    /// Left-hand side nonterminal symbol.
    pub symbol: String,
    /// Log-probability.
    pub weight: f64,
    /// Right-hand side that is matched against input graphs.
    pub rhs1: Rhs,
    /// Second right-hand side of a synchronous rule.
    pub rhs2: Option<Rhs>,
    /// Order in which `rhs1.graph().triples()` are consumed.
    pub rhs1_visit_order: Vec<usize>,
    /// Order in which the second right-hand side's triples are consumed.
    pub rhs2_visit_order: Option<Vec<usize>>,
    /// `true` if `rhs1` has no nonterminal edge.
    pub is_terminal: bool,
    /// Whether `weight` was given as a log-probability in the source file;
    /// only affects rendering.
    pub log_prob: bool,
}

impl Rule {
    /// Builds a rule with canonical visit orders.
    ///
    /// `rhs1` must have exactly one root.
    pub fn new(
        rule_id: RuleId,
        symbol: impl Into<String>,
        weight: f64,
        rhs1: Rhs,
        rhs2: Option<Rhs>,
    ) -> Result<Self, GrammarErrorKind> {
        let roots = rhs1.graph().roots().len();
        if roots != 1 {
            return Err(GrammarErrorKind::RuleInit(format!(
                "right-hand side must have exactly one root, found {roots}"
            )));
        }
        let is_terminal = rhs1.graph().nonterminal_edges().is_empty();
        let rhs1_visit_order = (0..rhs1.graph().triples().len()).collect();
        let rhs2_visit_order = rhs2
            .as_ref()
            .map(|rhs| (0..rhs.graph().triples().len()).collect());
        Ok(Self {
            rule_id,
            symbol: symbol.into(),
            weight,
            rhs1,
            rhs2,
            rhs1_visit_order,
            rhs2_visit_order,
            is_terminal,
            log_prob: false,
        })
    }

    /// Replaces the `rhs1` visit order; it must be a permutation of the edge
    /// positions.
    pub fn with_visit_order(mut self, order: Vec<usize>) -> Result<Self, GrammarErrorKind> {
        let n = self.rhs1.graph().triples().len();
        let distinct: BTreeSet<usize> = order.iter().copied().collect();
        if order.len() != n || distinct.len() != n || order.iter().any(|&i| i >= n) {
            return Err(GrammarErrorKind::RuleInit(format!(
                "visit order {order:?} is not a permutation of 0..{n}"
            )));
        }
        self.rhs1_visit_order = order;
        Ok(self)
    }

    /// Number of `rhs1` edges; an item of this rule is closed at this size.
    #[inline]
    pub fn len(&self) -> usize {
        self.rhs1_visit_order.len()
    }

    /// Returns `true` for a rule with an empty `rhs1`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rhs1_visit_order.is_empty()
    }

    /// Number of external nodes of `rhs1`.
    #[inline]
    pub fn external_arity(&self) -> usize {
        self.rhs1.graph().external_count()
    }

    /// Digest of everything that defines the rule: id, symbol, weight, both
    /// right-hand sides and the visit order.
    pub fn fingerprint(&self) -> HashValue {
        let mut data = Vec::new();
        data.extend_from_slice(&self.rule_id.as_u32().to_le_bytes());
        data.extend_from_slice(&self.weight.to_bits().to_le_bytes());
        for part in [
            self.symbol.clone(),
            self.rhs1.to_string(),
            self.rhs2.as_ref().map(ToString::to_string).unwrap_or_default(),
        ] {
            data.extend_from_slice(&(part.len() as u64).to_le_bytes());
            data.extend_from_slice(part.as_bytes());
        }
        for &position in &self.rhs1_visit_order {
            data.extend_from_slice(&(position as u64).to_le_bytes());
        }
        HashValue::hash_with_domain(b"GRAMMAR_RULE", &data)
    }

    /// Nonterminal symbols `rhs1` requires.
    pub fn required_symbols(&self) -> BTreeSet<String> {
        self.rhs1
            .graph()
            .triples()
            .iter()
            .filter_map(|t| match &t.label {
                EdgeLabel::Nonterminal(nt) => Some(nt.symbol.clone()),
                EdgeLabel::Terminal(_) => None,
            })
            .collect()
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.rule_id == other.rule_id
    }
}

impl Eq for Rule {}

impl Hash for Rule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rule_id.hash(state);
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let weight = if self.log_prob {
            self.weight
        } else {
            self.weight.exp()
        };
        match &self.rhs2 {
            Some(rhs2) => write!(f, "{} -> {} | {} ; {:.10}", self.symbol, self.rhs1, rhs2, weight),
            None => write!(f, "{} -> {} ; {:.10}", self.symbol, self.rhs1, weight),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_rule(text: &str) -> Rule {
        let rhs = Rhs::graph_rhs(Hypergraph::from_string(text).unwrap());
        Rule::new(RuleId::new(1), "S", 0.5f64.ln(), rhs, None).unwrap()
    }

    #[test]
    fn canonical_visit_order_and_terminality() {
        let rule = graph_rule("(. :A$1 (.*0) :b .*1)");
        assert_eq!(rule.rhs1_visit_order, vec![0, 1]);
        assert!(!rule.is_terminal);
        assert_eq!(rule.external_arity(), 2);
        assert_eq!(rule.required_symbols(), BTreeSet::from(["A".to_string()]));

        let leaf = graph_rule("(. :b .*0)");
        assert!(leaf.is_terminal);
    }

    #[test]
    fn visit_order_must_be_a_permutation() {
        let rule = graph_rule("(. :a . :b .)");
        assert!(rule.clone().with_visit_order(vec![1, 0]).is_ok());
        assert!(rule.clone().with_visit_order(vec![0, 0]).is_err());
        assert!(rule.with_visit_order(vec![0]).is_err());
    }

    #[test]
    fn rules_need_a_single_root() {
        let rhs = Rhs::graph_rhs(Hypergraph::from_string("(a. :x) (b. :y)").unwrap());
        let err = Rule::new(RuleId::new(3), "S", 0.0, rhs, None).unwrap_err();
        assert!(matches!(err, GrammarErrorKind::RuleInit(_)));
    }

    #[test]
    fn display_renders_probability() {
        let rule = graph_rule("(. :b .*0)");
        assert_eq!(rule.to_string(), "S -> (. :b .*0) ; 0.5000000000");

        let chain = Hypergraph::from_tokens(&["the", "N$1"]).unwrap();
        let mut string_rule =
            Rule::new(RuleId::new(2), "NP", -1.0, Rhs::string_rhs(chain), None).unwrap();
        string_rule.log_prob = true;
        assert_eq!(string_rule.to_string(), "NP -> the N$1 ; -1.0000000000");
    }

    #[test]
    fn identity_is_the_rule_id() {
        let a = graph_rule("(. :b .*0)");
        let b = graph_rule("(. :c .*0)");
        assert_eq!(a, b);
    }
}
