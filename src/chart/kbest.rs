//! Weighted derivation search over a [`CkyChart`].
//!
//! Scores are log-probabilities: a derivation scores the sum of the weights
//! of its rules, START contributing `0.0`. The search is local and bounded:
//! for every expansion of a key the best `k_best` combinations of its
//! children's `k_best` lists are kept, all expansions of the key are pooled
//! and the pool is cut to `k_best` again.
//!
//! [`CkyChart::labelled_derivations`] drops derivations that label an input
//! node twice while searching, so they never take a place in the top k.

use super::{ChartKey, CkyChart, Slot};
use crate::derivation::{Derivation, ScoredDerivation};
use crate::graph::Hypergraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Settings for [`CkyChart::derivations`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Derivations kept per key; `None` keeps every derivation.
    pub k_best: Option<usize>,
    /// Search step ceiling. Once reached, remaining expansions are skipped.
    pub max_steps: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            k_best: Some(1),
            max_steps: None,
        }
    }
}

impl SearchConfig {
    /// Sets how many derivations are kept.
    #[must_use]
    pub fn with_k_best(mut self, k_best: Option<usize>) -> Self {
        self.k_best = k_best;
        self
    }

    /// Sets the step ceiling.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// Result of a derivation search.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Derivations, best first.
    pub derivations: Vec<ScoredDerivation>,
    /// Keys and leaves visited.
    pub steps: usize,
}

impl CkyChart {
    /// Best derivations from START.
    pub fn derivations(&self, config: &SearchConfig) -> SearchOutcome {
        self.derivations_from(&ChartKey::Start, config)
    }

    /// Best derivations of `key`.
    pub fn derivations_from(&self, key: &ChartKey, config: &SearchConfig) -> SearchOutcome {
        self.search(key, config, None)
    }

    /// Best derivations from START whose node labelling is consistent.
    ///
    /// See [`Derivation::node_labels`]; a subderivation with a conflict
    /// rules out every derivation containing it.
    pub fn labelled_derivations(
        &self,
        config: &SearchConfig,
        input: &Hypergraph,
        skip_symbol: Option<&str>,
    ) -> SearchOutcome {
        let consistent: &dyn Fn(&Derivation) -> bool =
            &|d| d.node_labels(input, skip_symbol).is_ok();
        self.search(&ChartKey::Start, config, Some(consistent))
    }

    fn search(
        &self,
        key: &ChartKey,
        config: &SearchConfig,
        accept: Option<&dyn Fn(&Derivation) -> bool>,
    ) -> SearchOutcome {
        let mut search = Search {
            chart: self,
            config,
            accept,
            steps: 0,
            memo: config.max_steps.is_none().then(HashMap::new),
        };
        let derivations = search.run(key);
        if derivations.is_empty() && key.is_start() {
            tracing::debug!("no derivations");
        }
        tracing::info!(
            found = derivations.len(),
            steps = search.steps,
            "derivation search finished"
        );
        SearchOutcome {
            derivations,
            steps: search.steps,
        }
    }

    /// Greedy derivation from START: the first expansion at every level.
    pub fn first_derivation(&self) -> Option<ScoredDerivation> {
        self.first_derivation_from(&ChartKey::Start)
    }

    /// Greedy derivation of `key`.
    pub fn first_derivation_from(&self, key: &ChartKey) -> Option<ScoredDerivation> {
        let own = own_weight(key);
        let Some(expansion) = self.get(key).and_then(<[_]>::first) else {
            return match key {
                ChartKey::Start => None,
                ChartKey::Item(item) => Some(ScoredDerivation {
                    score: own,
                    derivation: Arc::new(Derivation::Leaf(item.clone())),
                }),
            };
        };
        let mut score = own;
        let mut children = std::collections::BTreeMap::new();
        for (slot, child) in expansion {
            let sub = self.first_derivation_from(&ChartKey::Item(child.clone()))?;
            score += sub.score;
            children.insert(slot.clone(), sub.derivation);
        }
        Some(ScoredDerivation {
            score,
            derivation: Arc::new(Derivation::Node {
                key: key.clone(),
                children,
            }),
        })
    }
}

fn own_weight(key: &ChartKey) -> f64 {
    match key {
        ChartKey::Start => 0.0,
        ChartKey::Item(item) => item.rule().weight,
    }
}

fn sort_best_first(list: &mut [(f64, Vec<(Slot, Arc<Derivation>)>)]) {
    list.sort_by(|a, b| b.0.total_cmp(&a.0));
}

struct Search<'c> {
    chart: &'c CkyChart,
    config: &'c SearchConfig,
    accept: Option<&'c dyn Fn(&Derivation) -> bool>,
    steps: usize,
    memo: Option<HashMap<ChartKey, Vec<ScoredDerivation>>>,
}

impl Search<'_> {
    fn out_of_steps(&self) -> bool {
        self.config.max_steps.is_some_and(|limit| self.steps >= limit)
    }

    fn run(&mut self, key: &ChartKey) -> Vec<ScoredDerivation> {
        if let Some(hit) = self.memo.as_ref().and_then(|memo| memo.get(key)) {
            return hit.clone();
        }
        let chart = self.chart;
        let own = own_weight(key);
        let Some(expansions) = chart.get(key) else {
            self.steps += 1;
            return match key {
                ChartKey::Start => Vec::new(),
                ChartKey::Item(item) => vec![ScoredDerivation {
                    score: own,
                    derivation: Arc::new(Derivation::Leaf(item.clone())),
                }],
            };
        };

        let mut pool = Vec::new();
        for expansion in expansions {
            if self.out_of_steps() {
                tracing::warn!(steps = self.steps, "derivation search budget reached");
                break;
            }
            let mut partial = vec![(own, Vec::with_capacity(expansion.len()))];
            for (slot, child) in expansion {
                let child_best = self.run(&ChartKey::Item(child.clone()));
                partial = self.combine(partial, slot, &child_best);
            }
            pool.extend(partial);
        }
        sort_best_first(&mut pool);

        let mut result = Vec::new();
        for (score, children) in pool {
            if self.config.k_best.is_some_and(|k| result.len() >= k) {
                break;
            }
            let derivation = Derivation::Node {
                key: key.clone(),
                children: children.into_iter().collect(),
            };
            if self.accept.is_some_and(|accept| !accept(&derivation)) {
                continue;
            }
            result.push(ScoredDerivation {
                score,
                derivation: Arc::new(derivation),
            });
        }
        self.steps += 1;
        if let Some(memo) = self.memo.as_mut() {
            memo.insert(key.clone(), result.clone());
        }
        result
    }

    /// Extends every partial combination with every derivation of one child,
    /// keeping the best `k_best`.
    ///
    /// Sums are monotone, so cutting after each child keeps the overall top k.
    /// With an acceptance test nothing is cut here, since a combination may
    /// still be rejected once its node is built.
    fn combine(
        &self,
        partial: Vec<(f64, Vec<(Slot, Arc<Derivation>)>)>,
        slot: &Slot,
        child_best: &[ScoredDerivation],
    ) -> Vec<(f64, Vec<(Slot, Arc<Derivation>)>)> {
        let mut next = Vec::with_capacity(partial.len() * child_best.len());
        for (score, children) in &partial {
            for child in child_best {
                let mut extended = children.clone();
                extended.push((slot.clone(), child.derivation.clone()));
                next.push((score + child.score, extended));
            }
        }
        sort_best_first(&mut next);
        if let (Some(k), None) = (self.config.k_best, self.accept) {
            next.truncate(k);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Grammar, GrammarOptions};
    use crate::graph::Hypergraph;
    use crate::parser::Parser;

    // Two ways to derive each of A and B, and two S rules.
    const GRAMMAR: &str = "\
S -> (. :A$1 .*0 :B$2 .*1) ; 0.6
S -> (. :B$2 .*1 :A$1 .*0) ; 0.4
A -> (. :a .*0) ; 0.7
A -> (. :C$1 .*0) ; 0.3
C -> (. :a .*0) ; 1.0
B -> (. :b .*0) ; 0.9
B -> (. :D$1 .*0) ; 0.1
D -> (. :b .*0) ; 1.0
";

    fn chart() -> CkyChart {
        let g = Grammar::load_from_str(GRAMMAR, GrammarOptions::default()).unwrap();
        let input = Hypergraph::from_string("(x. :a y. :b z.)").unwrap();
        Parser::new(&g).parse_to_cky(&input).unwrap().0
    }

    #[test]
    fn all_derivations_are_found_and_sorted() {
        let chart = chart();
        let all = chart.derivations(&SearchConfig::default().with_k_best(None));
        // 2 S rules x 2 A derivations x 2 B derivations
        assert_eq!(all.derivations.len(), 8);
        for pair in all.derivations.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        let best = &all.derivations[0];
        assert!((best.score - (0.6f64 * 0.7 * 0.9).ln()).abs() < 1e-9);
        assert_eq!(best.derivation.format(), "1(A$1(3) B$2(6))");
    }

    #[test]
    fn k_best_prefix_matches_exhaustive_search() {
        let chart = chart();
        let all = chart.derivations(&SearchConfig::default().with_k_best(None));
        let top3 = chart.derivations(&SearchConfig::default().with_k_best(Some(3)));
        assert_eq!(top3.derivations.len(), 3);
        for (a, b) in top3.derivations.iter().zip(&all.derivations) {
            assert!((a.score - b.score).abs() < 1e-12);
        }
    }

    #[test]
    fn first_derivation_and_empty_chart() {
        let chart = chart();
        let first = chart.first_derivation().unwrap();
        assert!(first.score <= 0.0);
        assert_eq!(first.derivation.final_item().unwrap().symbol(), "S");

        let empty = CkyChart::new();
        assert!(empty.first_derivation().is_none());
        let outcome = empty.derivations(&SearchConfig::default());
        assert!(outcome.derivations.is_empty());
        assert_eq!(outcome.steps, 1);
    }

    #[test]
    fn conflicting_labellings_do_not_take_a_slot() {
        // The better S rule puts A and B on the same node.
        let text = "\
S -> (. :A$1 n.*0 :B$2 n.) ; 0.9
S -> (. :A$1 n.*0 :b n.) ; 0.1
A -> (. :a .*0) ;
B -> (. :b .*0) ;
";
        let g = Grammar::load_from_str(text, GrammarOptions::default()).unwrap();
        let input = Hypergraph::from_string("(x. :a y. :b y.)").unwrap();
        let (chart, _) = Parser::new(&g).parse_to_cky(&input).unwrap();
        let config = SearchConfig::default().with_k_best(Some(1));

        let plain = chart.derivations(&config).derivations;
        assert_eq!(plain[0].derivation.format(), "1(A$1(3) B$2(4))");

        let labelled = chart.labelled_derivations(&config, &input, Some("S")).derivations;
        assert_eq!(labelled.len(), 1);
        assert_eq!(labelled[0].derivation.format(), "2(A$1(3))");
        assert!((labelled[0].score - 0.1f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn step_ceiling_skips_expansions() {
        let chart = chart();
        let unbounded = chart.derivations(&SearchConfig::default().with_k_best(None));
        let bounded = chart.derivations(
            &SearchConfig::default()
                .with_k_best(None)
                .with_max_steps(Some(3)),
        );
        assert!(bounded.derivations.len() < unbounded.derivations.len());
        assert!(!bounded.derivations.is_empty());
    }
}
