//! Grammars: rule storage, lookup indices and reachability filtering.
//!
//! # Reachability
//! Large grammars are pruned per input before parsing. A rule is a seed when
//! all of its own terminal edges occur in the input, or when it has no
//! terminal edges at all. The seed set is then closed over the nonterminals
//! the selected rules require: every rule producing a required symbol is
//! added, until nothing changes.

pub mod loader;
pub mod rule;

pub use rule::{Rhs, RhsFormat, Rule, RuleId};

use crate::error::{GrammarError, GrammarResult};
use crate::graph::{Hypergraph, TerminalKey};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Options that influence how a grammar is read and matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarOptions {
    /// Match node labels as well as edge labels.
    pub node_labels: bool,
    /// Weights in the file are already log-probabilities.
    pub log_prob: bool,
    /// Swap the two right-hand sides of a synchronous grammar.
    pub reverse: bool,
}

impl GrammarOptions {
    /// Sets node-label matching.
    #[must_use]
    pub fn with_node_labels(mut self, node_labels: bool) -> Self {
        self.node_labels = node_labels;
        self
    }

    /// Sets log-probability weights.
    #[must_use]
    pub fn with_log_prob(mut self, log_prob: bool) -> Self {
        self.log_prob = log_prob;
        self
    }

    /// Sets right-hand side reversal.
    #[must_use]
    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
}

/// A set of rules keyed by rule id, plus lookup tables.
#[derive(Debug, Clone)]
pub struct Grammar {
    rules: IndexMap<RuleId, Arc<Rule>>,
    start_symbol: String,
    options: GrammarOptions,
    is_synchronous: bool,
    rhs1_format: Option<RhsFormat>,
    rhs2_format: Option<RhsFormat>,
    nonterminal_to_rules: IndexMap<String, BTreeSet<RuleId>>,
    lhs_to_rules: IndexMap<(String, usize), BTreeSet<RuleId>>,
    rule_terminals: IndexMap<RuleId, BTreeSet<TerminalKey>>,
}

impl Grammar {
    /// Builds a grammar from rules; the first rule's symbol is the start symbol.
    pub fn from_rules(rules: Vec<Rule>, options: GrammarOptions) -> GrammarResult<Self> {
        let start_symbol = rules.first().ok_or(GrammarError::Empty)?.symbol.clone();
        let rhs1_format = rules.first().map(|r| r.rhs1.format());
        let rhs2_format = rules.first().and_then(|r| r.rhs2.as_ref().map(Rhs::format));
        let is_synchronous = rules.first().is_some_and(|r| r.rhs2.is_some());

        let mut nonterminal_to_rules: IndexMap<String, BTreeSet<RuleId>> = IndexMap::new();
        let mut lhs_to_rules: IndexMap<(String, usize), BTreeSet<RuleId>> = IndexMap::new();
        let mut rule_terminals = IndexMap::new();
        let mut by_id = IndexMap::with_capacity(rules.len());
        for rule in rules {
            let id = rule.rule_id;
            nonterminal_to_rules
                .entry(rule.symbol.clone())
                .or_default()
                .insert(id);
            lhs_to_rules
                .entry((rule.symbol.clone(), rule.external_arity()))
                .or_default()
                .insert(id);
            let (terminals, _) = rule
                .rhs1
                .graph()
                .get_terminals_and_nonterminals(options.node_labels);
            rule_terminals.insert(id, terminals);
            by_id.insert(id, Arc::new(rule));
        }
        by_id.sort_keys();

        Ok(Self {
            rules: by_id,
            start_symbol,
            options,
            is_synchronous,
            rhs1_format,
            rhs2_format,
            nonterminal_to_rules,
            lhs_to_rules,
            rule_terminals,
        })
    }

    pub(crate) fn with_formats(
        mut self,
        is_synchronous: bool,
        rhs1_format: Option<RhsFormat>,
        rhs2_format: Option<RhsFormat>,
    ) -> Self {
        self.is_synchronous = is_synchronous;
        self.rhs1_format = rhs1_format;
        self.rhs2_format = rhs2_format;
        self
    }

    /// Looks up a rule.
    pub fn get(&self, id: RuleId) -> Option<&Arc<Rule>> {
        self.rules.get(&id)
    }

    /// Rules in rule-id order.
    pub fn rules(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.values()
    }

    /// All rule ids in order.
    pub fn rule_ids(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.rules.keys().copied()
    }

    /// Number of rules.
    #[inline]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if there are no rules.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// LHS of the first rule.
    #[inline]
    pub fn start_symbol(&self) -> &str {
        &self.start_symbol
    }

    /// Options the grammar was built with.
    #[inline]
    pub fn options(&self) -> GrammarOptions {
        self.options
    }

    /// Whether node labels take part in matching.
    #[inline]
    pub fn node_labels(&self) -> bool {
        self.options.node_labels
    }

    /// Whether every rule has two right-hand sides.
    #[inline]
    pub fn is_synchronous(&self) -> bool {
        self.is_synchronous
    }

    /// Format of the first right-hand sides.
    #[inline]
    pub fn rhs1_format(&self) -> Option<RhsFormat> {
        self.rhs1_format
    }

    /// Format of the second right-hand sides.
    #[inline]
    pub fn rhs2_format(&self) -> Option<RhsFormat> {
        self.rhs2_format
    }

    /// Rules whose LHS is `symbol`.
    pub fn nonterminal_to_rules(&self, symbol: &str) -> Option<&BTreeSet<RuleId>> {
        self.nonterminal_to_rules.get(symbol)
    }

    /// Rules with LHS `symbol` whose `rhs1` has `arity` external nodes.
    pub fn lhs_to_rules(&self, symbol: &str, arity: usize) -> Option<&BTreeSet<RuleId>> {
        self.lhs_to_rules.get(&(symbol.to_string(), arity))
    }

    /// Terminal keys of one rule's `rhs1`.
    pub fn rule_terminals(&self, id: RuleId) -> Option<&BTreeSet<TerminalKey>> {
        self.rule_terminals.get(&id)
    }

    /// Rules whose terminals all occur in `input`, plus rules without terminals.
    pub fn terminal_filter(&self, input: &Hypergraph) -> Vec<RuleId> {
        let (input_terminals, _) = input.get_terminals_and_nonterminals(self.options.node_labels);
        self.rule_terminals
            .iter()
            .filter(|(_, terminals)| terminals.is_subset(&input_terminals))
            .map(|(&id, _)| id)
            .collect()
    }

    /// Rules that can take part in a parse of `input`.
    pub fn reachable_rules(&self, input: &Hypergraph) -> BTreeSet<RuleId> {
        let mut todo = self.terminal_filter(input);
        let mut result = BTreeSet::new();
        while let Some(id) = todo.pop() {
            if !result.insert(id) {
                continue;
            }
            let Some(rule) = self.rules.get(&id) else {
                continue;
            };
            for symbol in rule.required_symbols() {
                if let Some(producers) = self.nonterminal_to_rules.get(&symbol) {
                    todo.extend(producers.iter().filter(|p| !result.contains(*p)));
                }
            }
        }
        tracing::debug!(
            total = self.rules.len(),
            reachable = result.len(),
            "filtered grammar by input terminals"
        );
        result
    }
}
