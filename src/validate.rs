//! Grammar membership checks.
//!
//! A membership check parses one graph with early stopping, takes the greedy
//! first derivation and reports which rules it used and which input nodes it
//! left uncovered.

use crate::chart::ChartStats;
use crate::derivation::ScoredDerivation;
use crate::error::ValidationError;
use crate::grammar::{Grammar, GrammarOptions, RuleId};
use crate::graph::Hypergraph;
use crate::parser::{ParseStats, Parser, ParserConfig};
use std::collections::BTreeMap;

/// Outcome of [`check_membership`].
#[derive(Debug, Clone)]
pub struct MembershipReport {
    /// A derivation of the whole graph was found.
    pub accepted: bool,
    /// The first derivation, if any.
    pub derivation: Option<ScoredDerivation>,
    /// Rule use counts of that derivation.
    pub used_rules: BTreeMap<RuleId, usize>,
    /// Grammar rules the derivation does not use.
    pub unused_rules: Vec<RuleId>,
    /// Names of input nodes outside the derivation; every node when nothing
    /// was accepted.
    pub uncovered_nodes: Vec<String>,
    /// Parser diagnostics.
    pub stats: ParseStats,
    /// Size of the CKY chart.
    pub chart_stats: ChartStats,
}

impl MembershipReport {
    /// Score of the derivation.
    pub fn score(&self) -> Option<f64> {
        self.derivation.as_ref().map(|d| d.score)
    }

    /// Fails unless the derivation covers every input node.
    pub fn ensure_covers_all_nodes(&self) -> Result<(), ValidationError> {
        if self.uncovered_nodes.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::NodesNotCovered {
                uncovered: self.uncovered_nodes.clone(),
            })
        }
    }
}

/// Checks whether `input` is in the language of `grammar`.
///
/// `config` is used as given except that parsing stops at the first parse.
pub fn check_membership(
    grammar: &Grammar,
    input: &Hypergraph,
    config: ParserConfig,
) -> Result<MembershipReport, ValidationError> {
    let parser = Parser::with_config(grammar, config.with_stop_at_first(true));
    let (chart, stats) = parser.parse_to_cky(input)?;
    let derivation = chart.first_derivation();

    let (used_rules, uncovered_nodes) = match &derivation {
        Some(found) => {
            let covered = found.derivation.matched_nodes();
            let uncovered = input
                .node_ids()
                .filter(|n| !covered.contains(n))
                .map(|n| input.node_name(n).to_string())
                .collect();
            (found.derivation.used_rules(), uncovered)
        }
        None => (
            BTreeMap::new(),
            input.node_ids().map(|n| input.node_name(n).to_string()).collect(),
        ),
    };
    let unused_rules = grammar
        .rule_ids()
        .filter(|id| !used_rules.contains_key(id))
        .collect();

    let report = MembershipReport {
        accepted: derivation.is_some(),
        derivation,
        used_rules,
        unused_rules,
        uncovered_nodes,
        stats,
        chart_stats: chart.stats(),
    };
    tracing::info!(
        accepted = report.accepted,
        used = report.used_rules.len(),
        uncovered = report.uncovered_nodes.len(),
        "membership check finished"
    );
    Ok(report)
}

/// [`check_membership`] on a grammar and a graph given as text.
pub fn check_membership_str(
    grammar: &str,
    options: GrammarOptions,
    input: &str,
    config: ParserConfig,
) -> Result<MembershipReport, ValidationError> {
    let grammar = Grammar::load_from_str(grammar, options)?;
    let input = Hypergraph::from_string(input)?;
    check_membership(&grammar, &input, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::BudgetPolicy;

    const GRAMMAR: &str = "\
S -> (. :A$1 .*0) ;
A -> (. :a .*0) ;
A -> (. :b .*0) ;
";

    #[test]
    fn accepted_graph_report() {
        let report =
            check_membership_str(GRAMMAR, GrammarOptions::default(), "(x. :a y.)", ParserConfig::default())
                .unwrap();
        assert!(report.accepted);
        assert_eq!(report.score(), Some(0.0));
        let used: Vec<u32> = report.used_rules.keys().map(|r| r.as_u32()).collect();
        assert_eq!(used, vec![1, 2]);
        assert_eq!(report.unused_rules, vec![RuleId::new(3)]);
        assert!(report.uncovered_nodes.is_empty());
        assert!(report.ensure_covers_all_nodes().is_ok());
        assert_eq!(report.chart_stats.start_productions, 1);
    }

    #[test]
    fn rejected_graph_covers_nothing() {
        let report =
            check_membership_str(GRAMMAR, GrammarOptions::default(), "(x. :c y.)", ParserConfig::default())
                .unwrap();
        assert!(!report.accepted);
        assert!(report.derivation.is_none());
        assert_eq!(report.uncovered_nodes, vec!["x".to_string(), "y".to_string()]);
        match report.ensure_covers_all_nodes() {
            Err(ValidationError::NodesNotCovered { uncovered }) => assert_eq!(uncovered.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn partial_parse_leaves_nodes_uncovered() {
        let config = ParserConfig::default().with_partial(true);
        let report =
            check_membership_str(GRAMMAR, GrammarOptions::default(), "(x. :a y. :c z.)", config).unwrap();
        assert!(report.accepted);
        assert_eq!(report.uncovered_nodes, vec!["z".to_string()]);
        assert!(report.ensure_covers_all_nodes().is_err());
    }

    #[test]
    fn errors_are_wrapped() {
        let bad_grammar = check_membership_str("S (. :a .) ;", GrammarOptions::default(), "(x.)", ParserConfig::default());
        assert!(matches!(bad_grammar, Err(ValidationError::Grammar(_))));

        let bad_graph = check_membership_str(GRAMMAR, GrammarOptions::default(), "x", ParserConfig::default());
        assert!(matches!(bad_graph, Err(ValidationError::Graph(_))));

        let tight = ParserConfig::default()
            .with_max_steps(Some(1))
            .with_budget_policy(BudgetPolicy::Error);
        let budget = check_membership_str(GRAMMAR, GrammarOptions::default(), "(x. :a y.)", tight);
        assert!(matches!(budget, Err(ValidationError::Parse(_))));
    }
}
