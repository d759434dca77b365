//! Conversion of the raw parser chart into a CKY chart.

use super::{ChartKey, CkyChart, Expansion, RawChart, RawProduction, Slot};
use crate::error::ParseError;
use crate::graph::NodeId;
use crate::item::ItemRef;
use crate::parser::{BudgetPolicy, ParserConfig};
use indexmap::IndexSet;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Builds the CKY chart for everything reachable from START.
///
/// Only START and closed items become keys. Unless `config.permutations` is
/// set, expansions that use the same rules over the same input nodes are
/// kept once.
pub fn get_cky_chart(raw: &RawChart, config: &ParserConfig) -> Result<CkyChart, ParseError> {
    let reachable = scan(raw, config)?;

    let mut resolver = Resolver {
        raw,
        memo: HashMap::new(),
    };
    let mut chart = CkyChart::new();
    for key in &reachable {
        let expansions = match key {
            ChartKey::Start => start_expansions(raw),
            ChartKey::Item(item) if item.closed() => resolver.expansions(item),
            ChartKey::Item(_) => continue,
        };
        if expansions.is_empty() {
            continue;
        }
        let expansions = if config.permutations {
            expansions
        } else {
            filter_permutations(expansions)
        };
        chart.insert(key.clone(), expansions);
    }

    let stats = chart.stats();
    tracing::debug!(
        reachable = reachable.len(),
        keys = stats.keys,
        start_productions = stats.start_productions,
        child_refs = stats.child_refs,
        "converted raw chart"
    );
    Ok(chart)
}

/// Depth-first walk from START over every recorded production.
fn scan(raw: &RawChart, config: &ParserConfig) -> Result<IndexSet<ChartKey>, ParseError> {
    let mut stack = vec![ChartKey::Start];
    let mut seen = IndexSet::new();
    let mut steps = 0usize;
    while let Some(key) = stack.pop() {
        if config.cky_max_steps.is_some_and(|limit| steps >= limit) {
            match config.budget_policy {
                BudgetPolicy::Error => return Err(ParseError::CkyBudgetExceeded { steps }),
                BudgetPolicy::Truncate => {
                    tracing::warn!(steps, "CKY scan stopped at step ceiling");
                    break;
                }
            }
        }
        steps += 1;
        if seen.contains(&key) {
            continue;
        }
        if let Some(productions) = raw.get(&key) {
            for production in productions {
                match production {
                    RawProduction::Unary(a) => stack.push(ChartKey::Item(a.clone())),
                    RawProduction::Binary(a, b) => {
                        stack.push(ChartKey::Item(a.clone()));
                        stack.push(ChartKey::Item(b.clone()));
                    }
                }
            }
        }
        seen.insert(key);
    }
    Ok(seen)
}

fn start_expansions(raw: &RawChart) -> Vec<Expansion> {
    raw.accepted()
        .map(|item| Expansion::from([(Slot::Start, item.clone())]))
        .collect()
}

/// Collapses the derivation history of one rule instance into expansions.
struct Resolver<'c> {
    raw: &'c RawChart,
    memo: HashMap<ItemRef, Vec<Expansion>>,
}

impl Resolver<'_> {
    fn expansions(&mut self, item: &ItemRef) -> Vec<Expansion> {
        if let Some(known) = self.memo.get(item) {
            return known.clone();
        }
        let raw = self.raw;
        let mut result = Vec::new();
        let productions = raw.get(&ChartKey::Item(item.clone()));
        for production in productions.into_iter().flatten() {
            match production {
                // A shift adds no child; the children are those of the
                // predecessor.
                RawProduction::Unary(prev) => result.extend(self.expansions(prev)),
                RawProduction::Binary(prev, child) => {
                    let Some(slot) = prev.outside_nonterminal().cloned().map(Slot::Nt) else {
                        continue;
                    };
                    let earlier = self.expansions(prev);
                    if earlier.is_empty() {
                        result.push(Expansion::from([(slot, child.clone())]));
                    } else {
                        for mut expansion in earlier {
                            expansion.insert(slot.clone(), child.clone());
                            result.push(expansion);
                        }
                    }
                }
            }
        }
        self.memo.insert(item.clone(), result.clone());
        result
    }
}

/// Keeps the first expansion per (sorted rule ids, covered input nodes).
pub fn filter_permutations(expansions: Vec<Expansion>) -> Vec<Expansion> {
    let mut seen: HashSet<(Vec<u32>, BTreeSet<NodeId>)> = HashSet::new();
    expansions
        .into_iter()
        .filter(|expansion| {
            let mut rules: Vec<u32> = expansion.values().map(|i| i.rule_id().as_u32()).collect();
            rules.sort_unstable();
            let nodes: BTreeSet<NodeId> = expansion
                .values()
                .flat_map(|i| i.nodeset().iter().copied())
                .collect();
            seen.insert((rules, nodes))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Grammar, GrammarOptions};
    use crate::graph::Hypergraph;
    use crate::parser::Parser;

    const GRAMMAR: &str = "\
S -> (. :A$1 .*0 :B$2 .*1) ;
A -> (. :a .*0) ;
B -> (. :b .*0) ;
";

    fn raw_chart(grammar: &Grammar, input: &str) -> RawChart {
        let input = Hypergraph::from_string(input).unwrap();
        Parser::new(grammar).parse(&input).unwrap().chart
    }

    #[test]
    fn expansions_collect_one_child_per_slot() {
        let grammar = Grammar::load_from_str(GRAMMAR, GrammarOptions::default()).unwrap();
        let raw = raw_chart(&grammar, "(x. :a y. :b z.)");
        let cky = get_cky_chart(&raw, &ParserConfig::default()).unwrap();

        let start = cky.start_productions();
        assert_eq!(start.len(), 1);
        let top = &start[0][&Slot::Start];
        assert_eq!(top.symbol(), "S");

        let expansions = cky.get(&ChartKey::Item(top.clone())).unwrap();
        assert_eq!(expansions.len(), 1);
        let slots: Vec<String> = expansions[0].keys().map(ToString::to_string).collect();
        assert_eq!(slots, vec!["A$1", "B$2"]);
        let children: Vec<&str> = expansions[0].values().map(|i| i.symbol()).collect();
        assert_eq!(children, vec!["A", "B"]);

        // terminal-only children are leaves of the chart
        for child in expansions[0].values() {
            assert!(!cky.contains(&ChartKey::Item(child.clone())));
        }
        let stats = cky.stats();
        assert_eq!(stats.start_productions, 1);
        assert_eq!(stats.keys, 2);
        assert_eq!(stats.child_refs, 3);
    }

    #[test]
    fn no_parse_gives_empty_chart() {
        let grammar = Grammar::load_from_str(GRAMMAR, GrammarOptions::default()).unwrap();
        let raw = raw_chart(&grammar, "(x. :a y.)");
        let cky = get_cky_chart(&raw, &ParserConfig::default()).unwrap();
        assert!(cky.is_empty());
        assert!(cky.start_productions().is_empty());
    }

    #[test]
    fn scan_ceiling_follows_budget_policy() {
        let grammar = Grammar::load_from_str(GRAMMAR, GrammarOptions::default()).unwrap();
        let raw = raw_chart(&grammar, "(x. :a y. :b z.)");
        let strict = ParserConfig::default().with_cky_max_steps(Some(1));
        assert_eq!(
            get_cky_chart(&raw, &strict).unwrap_err(),
            ParseError::CkyBudgetExceeded { steps: 1 }
        );
        let lenient = strict.with_budget_policy(BudgetPolicy::Truncate);
        // only START was scanned, and its expansion is still resolved
        let cky = get_cky_chart(&raw, &lenient).unwrap();
        assert_eq!(cky.len(), 1);
    }

    #[test]
    fn permutations_are_filtered_by_rules_and_nodes() {
        // Two parses that use the same rules over the same nodes, bound in
        // swapped order.
        let text = "S -> (. :A$1 .*0 :A$2 .*1) ;\nA -> (. :a .*0) ;\n";
        let grammar = Grammar::load_from_str(text, GrammarOptions::default()).unwrap();
        let raw = raw_chart(&grammar, "(x. :a y. :a z.)");

        let all = get_cky_chart(&raw, &ParserConfig::default().with_permutations(true)).unwrap();
        let filtered = get_cky_chart(&raw, &ParserConfig::default()).unwrap();
        assert_eq!(all.start_productions().len(), 2);
        assert_eq!(filtered.start_productions().len(), 1);
    }
}
