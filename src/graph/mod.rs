//! Hypergraphs, edge labels and the textual graph description format.
//!
//! Input graphs and rule right-hand sides share one representation,
//! [`Hypergraph`]. Rule fragments additionally use external nodes (ports)
//! and nonterminal edge labels.

pub mod description;
pub mod hypergraph;
pub mod label;

pub use crate::arena::NodeId;
pub use hypergraph::{EdgeId, Hypergraph, LabeledTriple, NodeData, TerminalKey, Triple};
pub use label::{EdgeLabel, NonterminalLabel};
