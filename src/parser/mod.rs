//! Deductive chart parser.
//!
//! The parser starts from one axiom item per reachable rule and explores the
//! item space breadth first. Popping an item does one of three things:
//!
//! - a closed item is checked for acceptance, indexed by its symbol, and every
//!   open item waiting for that symbol is put back on the agenda;
//! - an open item expecting a nonterminal is indexed as waiting and tries
//!   every closed item of that symbol seen so far;
//! - an open item expecting a terminal shifts every matching input edge.
//!
//! Each derived item is recorded in the raw chart together with how it was
//! derived. Completion attempts are remembered per item pair so that a woken
//! item only tries new partners.

pub mod agenda;
pub mod config;
pub mod stats;

pub use agenda::Agenda;
pub use config::{BudgetPolicy, ParserConfig};
pub use stats::ParseStats;

use crate::chart::cky::get_cky_chart;
use crate::chart::{ChartKey, CkyChart, RawChart, RawProduction};
use crate::error::ParseError;
use crate::grammar::Grammar;
use crate::graph::{EdgeId, EdgeLabel, Hypergraph};
use crate::item::{HergItem, ItemRef};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Result of [`Parser::parse`].
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    /// Everything derived, with derivation steps.
    pub chart: RawChart,
    /// Diagnostics.
    pub stats: ParseStats,
}

/// Parser bound to one grammar.
#[derive(Debug, Clone)]
pub struct Parser<'g> {
    grammar: &'g Grammar,
    config: ParserConfig,
}

impl<'g> Parser<'g> {
    /// Creates a parser with the default configuration.
    pub fn new(grammar: &'g Grammar) -> Self {
        Self::with_config(grammar, ParserConfig::default())
    }

    /// Creates a parser with `config`.
    pub fn with_config(grammar: &'g Grammar, config: ParserConfig) -> Self {
        Self { grammar, config }
    }

    /// The grammar.
    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    /// The configuration.
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parses one input graph into a raw chart.
    pub fn parse(&self, input: &Hypergraph) -> Result<ParseOutcome, ParseError> {
        let started = Instant::now();
        let node_labels = self.grammar.node_labels();
        let start_symbol = self.grammar.start_symbol();
        let input_edges = input.triples().len();

        let mut edge_terminal_lookup: HashMap<&EdgeLabel, Vec<EdgeId>> = HashMap::new();
        for (pos, triple) in input.triples().iter().enumerate() {
            edge_terminal_lookup
                .entry(&triple.label)
                .or_default()
                .push(EdgeId::new(pos as u32));
        }

        let mut agenda = Agenda::new();
        let mut chart = RawChart::new();
        let mut attempted: HashSet<(ItemRef, ItemRef)> = HashSet::new();
        let mut nonterminal_lookup: IndexMap<String, IndexSet<ItemRef>> = IndexMap::new();
        let mut reverse_lookup: IndexMap<String, IndexSet<ItemRef>> = IndexMap::new();

        let reachable = self.grammar.reachable_rules(input);
        for rule in reachable.iter().filter_map(|&id| self.grammar.get(id)) {
            let axiom = Arc::new(HergItem::axiom(rule.clone(), node_labels));
            if let Some(symbol) = axiom.outside_symbol() {
                reverse_lookup
                    .entry(symbol.to_string())
                    .or_default()
                    .insert(axiom.clone());
            }
            agenda.push(axiom);
        }

        let mut stats = ParseStats {
            reachable_rules: reachable.len(),
            input_edges,
            ..ParseStats::default()
        };
        tracing::debug!(
            rules = reachable.len(),
            edges = input_edges,
            "starting parse"
        );

        while !agenda.is_empty() {
            if self.config.max_steps.is_some_and(|limit| stats.steps >= limit) {
                match self.config.budget_policy {
                    BudgetPolicy::Error => {
                        tracing::warn!(steps = stats.steps, queue = agenda.len(), "parse budget exceeded");
                        return Err(ParseError::BudgetExceeded {
                            steps: stats.steps,
                            queue_len: agenda.len(),
                            attempted_len: attempted.len(),
                        });
                    }
                    BudgetPolicy::Truncate => {
                        tracing::warn!(steps = stats.steps, queue = agenda.len(), "parse truncated");
                        stats.truncated = true;
                        break;
                    }
                }
            }
            stats.steps += 1;

            let Some(item) = agenda.pop() else {
                break;
            };

            if item.closed() {
                let full = self.successful_parse(&item, input_edges);
                if full || (self.config.partial && item.symbol() == start_symbol) {
                    chart.add(ChartKey::Start, RawProduction::Unary(item.clone()));
                }
                nonterminal_lookup
                    .entry(item.symbol().to_string())
                    .or_default()
                    .insert(item.clone());

                let mut woken = 0;
                if let Some(waiting) = reverse_lookup.get(item.symbol()) {
                    for open in waiting {
                        if agenda.requeue(open.clone()) {
                            woken += 1;
                        }
                    }
                }
                stats.max_growth_wakeup = stats.max_growth_wakeup.max(woken);

                if full && self.config.stop_at_first {
                    tracing::debug!(steps = stats.steps, "stopping at first parse");
                    break;
                }
            } else if let Some(symbol) = item.outside_symbol() {
                reverse_lookup
                    .entry(symbol.to_string())
                    .or_default()
                    .insert(item.clone());

                let mut grown = 0;
                if let Some(closed) = nonterminal_lookup.get(symbol) {
                    for other in closed {
                        if !attempted.insert((item.clone(), other.clone())) {
                            continue;
                        }
                        if !item.can_complete(other) {
                            continue;
                        }
                        let Some(next) = item.complete(other) else {
                            continue;
                        };
                        let next = Arc::new(next);
                        chart.add(
                            ChartKey::Item(next.clone()),
                            RawProduction::Binary(item.clone(), other.clone()),
                        );
                        if agenda.push(next) {
                            grown += 1;
                        }
                    }
                }
                stats.max_growth_complete = stats.max_growth_complete.max(grown);
            } else if let Some(outside) = item.outside_triple() {
                let mut grown = 0;
                let candidates = edge_terminal_lookup
                    .get(&outside.label)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                for &edge in candidates {
                    if !item.can_shift(input, edge) {
                        continue;
                    }
                    let Some(next) = item.shift(input, edge) else {
                        continue;
                    };
                    let next = Arc::new(next);
                    chart.add(ChartKey::Item(next.clone()), RawProduction::Unary(item.clone()));
                    if agenda.push(next) {
                        grown += 1;
                    }
                }
                stats.max_growth_shift = stats.max_growth_shift.max(grown);
            }
        }

        stats.max_queue_size = agenda.max_len();
        stats.accepted = chart.accepted().count();
        stats.elapsed = started.elapsed();
        tracing::info!(
            steps = stats.steps,
            max_queue = stats.max_queue_size,
            accepted = stats.accepted,
            chart = chart.len(),
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "parse finished"
        );
        Ok(ParseOutcome { chart, stats })
    }

    /// Parses one input graph and converts the chart to CKY form.
    pub fn parse_to_cky(&self, input: &Hypergraph) -> Result<(CkyChart, ParseStats), ParseError> {
        let outcome = self.parse(input)?;
        let chart = get_cky_chart(&outcome.chart, &self.config)?;
        Ok((chart, outcome.stats))
    }

    /// Parses each graph in turn.
    pub fn parse_graphs<'a, I>(
        &'a self,
        graphs: I,
    ) -> impl Iterator<Item = Result<(CkyChart, ParseStats), ParseError>> + 'a
    where
        I: IntoIterator<Item = &'a Hypergraph>,
        I::IntoIter: 'a,
    {
        graphs.into_iter().map(move |graph| self.parse_to_cky(graph))
    }

    /// Start symbol and every input edge consumed.
    fn successful_parse(&self, item: &HergItem, input_edges: usize) -> bool {
        item.symbol() == self.grammar.start_symbol() && item.shifted().len() == input_edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarOptions;

    const GRAMMAR: &str = "S -> (. :A$1 .*0) ;\nA -> (. :a .*0) ;\n";

    fn grammar(text: &str) -> Grammar {
        Grammar::load_from_str(text, GrammarOptions::default()).unwrap()
    }

    fn graph(text: &str) -> Hypergraph {
        Hypergraph::from_string(text).unwrap()
    }

    #[test]
    fn accepts_covering_start_item() {
        let g = grammar(GRAMMAR);
        let outcome = Parser::new(&g).parse(&graph("(x. :a y.)")).unwrap();
        assert!(outcome.chart.has_parse());
        let accepted: Vec<&ItemRef> = outcome.chart.accepted().collect();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].symbol(), "S");
        assert_eq!(accepted[0].shifted().len(), 1);

        let stats = outcome.stats;
        // S, A, A shifted, S woken, S completed
        assert_eq!(stats.steps, 5);
        assert_eq!(stats.reachable_rules, 2);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.max_growth_wakeup, 1);
        // both axioms were queued before the first pop
        assert_eq!(stats.max_queue_size, 2);
        assert!(!stats.truncated);
    }

    #[test]
    fn uncovered_edges_need_partial_mode() {
        let g = grammar(GRAMMAR);
        let input = graph("(x. :a y. :b z.)");
        let strict = Parser::new(&g).parse(&input).unwrap();
        assert!(!strict.chart.has_parse());

        let partial = Parser::with_config(&g, ParserConfig::default().with_partial(true))
            .parse(&input)
            .unwrap();
        assert!(partial.chart.has_parse());
    }

    #[test]
    fn budget_policy() {
        let g = grammar(GRAMMAR);
        let input = graph("(x. :a y.)");
        let config = ParserConfig::default().with_max_steps(Some(2));
        let err = Parser::with_config(&g, config.clone()).parse(&input).unwrap_err();
        assert!(matches!(err, ParseError::BudgetExceeded { steps: 2, .. }));

        let truncated = Parser::with_config(&g, config.with_budget_policy(BudgetPolicy::Truncate))
            .parse(&input)
            .unwrap();
        assert!(truncated.stats.truncated);
        assert_eq!(truncated.stats.steps, 2);
        assert!(!truncated.chart.has_parse());

        // a ceiling that is never reached changes nothing
        let roomy = ParserConfig::default().with_max_steps(Some(100));
        assert!(Parser::with_config(&g, roomy).parse(&input).unwrap().chart.has_parse());
    }

    #[test]
    fn stop_at_first_leaves_work_undone() {
        let text = "S -> (. :A$1 .*0) ;\nS -> (. :a .*0) ;\nA -> (. :a .*0) ;\n";
        let g = grammar(text);
        let input = graph("(x. :a y.)");
        let all = Parser::new(&g).parse(&input).unwrap();
        assert_eq!(all.stats.accepted, 2);
        let first = Parser::with_config(&g, ParserConfig::default().with_stop_at_first(true))
            .parse(&input)
            .unwrap();
        assert_eq!(first.stats.accepted, 1);
        assert!(first.stats.steps < all.stats.steps);
    }

    #[test]
    fn every_accepted_item_covers_the_input() {
        let text = "\
S -> (. :A$1 .*0 :A$2 .*1) ;
A -> (. :a .*0) ;
A -> (. :B$1 .*0) ;
B -> (. :a .*0) ;
";
        let g = grammar(text);
        let input = graph("(x. :a y. :a z.)");
        let outcome = Parser::new(&g).parse(&input).unwrap();
        assert!(outcome.stats.accepted > 0);
        for item in outcome.chart.accepted() {
            assert!(item.closed());
            assert_eq!(item.symbol(), "S");
            assert_eq!(item.shifted().len(), input.edge_count());
        }
    }

    #[test]
    fn parse_graphs_yields_cky_charts() {
        let g = grammar(GRAMMAR);
        let inputs = vec![graph("(x. :a y.)"), graph("(x. :b y.)")];
        let parser = Parser::new(&g);
        let charts: Vec<CkyChart> = parser
            .parse_graphs(&inputs)
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(charts[0].start_productions().len(), 1);
        assert!(charts[1].is_empty());
    }
}
