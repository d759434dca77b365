//! Edge labels: terminal strings and indexed nonterminals.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A nonterminal edge label.
///
/// A rule may contain several nonterminal edges with the same symbol; the
/// index tells them apart. Two labels are equal only if both symbol and index
/// agree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NonterminalLabel {
    /// Grammar symbol this edge stands for.
    pub symbol: String,
    /// Disambiguating index within one rule, if any.
    pub index: Option<String>,
}

impl NonterminalLabel {
    /// Creates a label with an explicit index.
    pub fn new(symbol: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            index: Some(index.into()),
        }
    }

    /// Creates a label without an index.
    pub fn unindexed(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            index: None,
        }
    }

    /// Parses `SYMBOL$index` (`$index` may be empty).
    ///
    /// Returns `None` if the token has no `$` or more than one.
    pub fn parse(token: &str) -> Option<Self> {
        let mut parts = token.split('$');
        let symbol = parts.next()?;
        let index = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            symbol: symbol.to_string(),
            index: (!index.is_empty()).then(|| index.to_string()),
        })
    }
}

impl fmt::Display for NonterminalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.index {
            Some(index) => write!(f, "{}${}", self.symbol, index),
            None => write!(f, "{}$", self.symbol),
        }
    }
}

/// Label of a hyperedge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeLabel {
    /// A terminal symbol matched literally against input edges.
    Terminal(String),
    /// A placeholder for a rule application.
    Nonterminal(NonterminalLabel),
}

impl EdgeLabel {
    /// Creates a terminal label.
    pub fn terminal(label: impl Into<String>) -> Self {
        EdgeLabel::Terminal(label.into())
    }

    /// Reads an edge label token: anything containing `$` is a nonterminal.
    ///
    /// Nonterminals without an index get `_<k>` from `auto_index`, which is
    /// advanced for each such label.
    pub fn from_token(token: &str, auto_index: &mut usize) -> Option<Self> {
        if !token.contains('$') {
            return Some(EdgeLabel::Terminal(token.to_string()));
        }
        let mut nt = NonterminalLabel::parse(token)?;
        if nt.index.is_none() {
            nt.index = Some(format!("_{}", *auto_index));
            *auto_index += 1;
        }
        Some(EdgeLabel::Nonterminal(nt))
    }

    /// Returns `true` for nonterminal labels.
    #[inline]
    pub fn is_nonterminal(&self) -> bool {
        matches!(self, EdgeLabel::Nonterminal(_))
    }

    /// Returns the nonterminal label, if this is one.
    #[inline]
    pub fn as_nonterminal(&self) -> Option<&NonterminalLabel> {
        match self {
            EdgeLabel::Nonterminal(nt) => Some(nt),
            EdgeLabel::Terminal(_) => None,
        }
    }

    /// Returns the terminal string, if this is one.
    #[inline]
    pub fn as_terminal(&self) -> Option<&str> {
        match self {
            EdgeLabel::Terminal(t) => Some(t),
            EdgeLabel::Nonterminal(_) => None,
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeLabel::Terminal(t) => f.write_str(t),
            EdgeLabel::Nonterminal(nt) => nt.fmt(f),
        }
    }
}
