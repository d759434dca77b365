//! hrg-parse: a chart parser for hyperedge replacement grammars.
//!
//! Given a grammar whose rules rewrite a nonterminal into a hypergraph
//! fragment, the parser decides whether an input hypergraph can be derived
//! and builds a chart of every way it can be. Derivations are then read off
//! the chart best first by rule weight.
//!
//! The pipeline:
//! - [`grammar::Grammar`] reads rules and prunes them per input
//!   ([`grammar::Grammar::reachable_rules`]);
//! - [`parser::Parser`] explores [`item::HergItem`]s breadth first and
//!   records a [`chart::RawChart`];
//! - [`chart::cky::get_cky_chart`] turns it into a [`chart::CkyChart`] of
//!   one-rule expansions;
//! - [`chart::CkyChart::derivations`] extracts k-best
//!   [`derivation::Derivation`] trees.
//!
//! String grammars are handled by the same machinery: a token string is a
//! chain graph (see [`graph::Hypergraph::from_tokens`]).
//!
//! # Example
//!
//! ```
//! use hrg_parse::prelude::*;
//!
//! let grammar = Grammar::load_from_str(
//!     "S -> (. :A$1 .*0) ;\nA -> (. :a .*0) ;\n",
//!     GrammarOptions::default(),
//! )
//! .unwrap();
//! let input = Hypergraph::from_string("(x. :a y.)").unwrap();
//! let (chart, _stats) = Parser::new(&grammar).parse_to_cky(&input).unwrap();
//! let best = chart.derivations(&SearchConfig::default()).derivations;
//! assert_eq!(best[0].derivation.format(), "1(A$1(2))");
//! ```

pub mod arena;
pub mod chart;
pub mod derivation;
pub mod error;
pub mod fingerprint;
pub mod grammar;
pub mod graph;
pub mod item;
pub mod parser;
pub mod validate;

pub use chart::{CkyChart, RawChart};
pub use error::{DerivationError, GrammarError, GraphError, ParseError, PersistError, ValidationError};
pub use grammar::{Grammar, GrammarOptions, Rule, RuleId};
pub use graph::{EdgeLabel, Hypergraph, NodeId, NonterminalLabel};
pub use item::{HergItem, ItemRef};
pub use parser::{Parser, ParserConfig};

/// Prelude for convenient usage.
pub mod prelude {
    pub use crate::chart::cky::get_cky_chart;
    pub use crate::chart::kbest::{SearchConfig, SearchOutcome};
    pub use crate::chart::{ChartKey, CkyChart, Expansion, RawChart, Slot};
    pub use crate::derivation::{k_best_unique, labelings, Derivation, ScoredDerivation};
    pub use crate::error::{
        DerivationError, GrammarError, GraphError, ParseError, PersistError, ValidationError,
    };
    pub use crate::fingerprint::HashValue;
    pub use crate::grammar::{Grammar, GrammarOptions, Rule, RuleId};
    pub use crate::graph::{EdgeId, EdgeLabel, Hypergraph, NodeId, NonterminalLabel};
    pub use crate::item::{HergItem, ItemRef};
    pub use crate::parser::{BudgetPolicy, ParseStats, Parser, ParserConfig};
    pub use crate::validate::{check_membership, MembershipReport};
}
