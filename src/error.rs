//! Error types for graph descriptions, grammars, parsing and derivations.
//!
//! Errors fall into four groups:
//! - fatal input errors (`GraphError`, `GrammarError`) abort loading of the
//!   offending graph or grammar;
//! - budget errors (`ParseError`) are recoverable per input: callers log them
//!   and move on to the next graph;
//! - derivation errors (`DerivationError`) are scoped to one candidate
//!   derivation and are skipped by k-best consumers;
//! - "no derivation" is never an error: it is an empty chart or an empty
//!   result list.

use crate::graph::NodeId;

/// Malformed graph description or inconsistent graph construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The graph description could not be parsed.
    #[error("graph description syntax error at byte {offset}: {message}")]
    Syntax {
        /// Byte offset into the description where the problem was detected.
        offset: usize,
        /// Human readable explanation.
        message: String,
    },
    /// A triple or root refers to a node name that was never declared.
    #[error("unknown node '{0}'")]
    UnknownNode(String),
    /// A node id is out of range for this graph.
    #[error("node {0} does not belong to this graph")]
    InvalidNode(NodeId),
}

/// What went wrong while reading one grammar rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarErrorKind {
    /// Missing `;` terminator or unreadable weight.
    #[error("error near end of line")]
    NearEndOfLine,
    /// Missing or repeated `->`.
    #[error("invalid rule format")]
    InvalidFormat,
    /// More than two right hand sides separated by `|`.
    #[error("only up to two RHSs are allowed in a grammar file")]
    TooManyRhs,
    /// Some rules are synchronous and some are not.
    #[error("all or none of the rules need to have two RHSs")]
    MixedSynchronous,
    /// A RHS could not be read as a graph although the grammar is a graph grammar.
    #[error("could not parse graph description: {0}")]
    Graph(GraphError),
    /// The two RHSs reference different nonterminal sets.
    #[error("nonterminals do not match between RHSs: {rhs1} {rhs2}")]
    NonterminalMismatch {
        /// Nonterminals of the first RHS, rendered.
        rhs1: String,
        /// Nonterminals of the second RHS, rendered.
        rhs2: String,
    },
    /// The rule could not be built from its parts.
    #[error("could not initialize rule: {0}")]
    RuleInit(String),
}

/// Fatal grammar loading error.
#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    /// A rule is malformed; carries the physical line and the 1-based rule number.
    #[error("line {line}, rule {rule}: {kind}")]
    Rule {
        /// Line on which the rule terminator was found.
        line: usize,
        /// Rule counter (1-based).
        rule: usize,
        /// What went wrong.
        kind: GrammarErrorKind,
    },
    /// The grammar contains no rule at all.
    #[error("grammar contains no rules")]
    Empty,
    /// Reading the grammar file failed.
    #[error("grammar I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Budget exhaustion during parsing or chart conversion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The agenda was still non-empty after `max_steps` pops.
    #[error("parse exceeded {steps} steps (queue {queue_len}, attempted pairs {attempted_len})")]
    BudgetExceeded {
        /// Steps taken.
        steps: usize,
        /// Items still waiting in the agenda.
        queue_len: usize,
        /// Distinct `(item, item)` pairs tried for completion.
        attempted_len: usize,
    },
    /// The reachability walk of the CKY conversion exceeded its ceiling.
    #[error("CKY conversion exceeded {steps} steps")]
    CkyBudgetExceeded {
        /// Steps taken.
        steps: usize,
    },
}

/// Error while reconstructing information from one derivation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DerivationError {
    /// Two subderivations assign different symbols to the same input node.
    #[error("node '{node}' labelled both {existing} and {new}")]
    ConflictingLabel {
        /// Input node name.
        node: String,
        /// Symbol assigned first.
        existing: String,
        /// Conflicting symbol.
        new: String,
    },
}

/// Error from a membership check.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The derivation does not cover every node of the input graph.
    #[error("nodes not covered by the derivation: {uncovered:?}")]
    NodesNotCovered {
        /// Names of the uncovered input nodes.
        uncovered: Vec<String>,
    },
    /// The grammar could not be loaded.
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    /// The input graph could not be read.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Parsing ran out of budget.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Error while saving or loading a persisted chart.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// CBOR encoding or decoding failed.
    #[error("chart encoding error: {0}")]
    Cbor(#[from] serde_cbor::Error),
    /// File access failed.
    #[error("chart I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A stored item references a rule the grammar does not have.
    #[error("persisted chart references unknown rule {0}")]
    UnknownRule(crate::grammar::RuleId),
    /// The grammar has a rule with this id, but not the rule the chart was
    /// built with.
    #[error("rule {0} differs from the rule the chart was built with")]
    RuleMismatch(crate::grammar::RuleId),
    /// A stored item does not fit the rule it names.
    #[error("persisted item for rule {rule} is inconsistent: {reason}")]
    InvalidItem {
        /// Rule the item names.
        rule: crate::grammar::RuleId,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result alias for graph construction.
pub type GraphResult<T> = Result<T, GraphError>;

/// Result alias for grammar loading.
pub type GrammarResult<T> = Result<T, GrammarError>;
