//! Textual graph descriptions.
//!
//! ```text
//! graph       := description+
//! description := '(' node? edge* ')'
//! edge        := ':' label child*
//! child       := description | node
//! node        := [id '.'] [label] ['*' rank]
//! ```
//!
//! A node token without a `.` is a node label. Writing an id that was
//! seen before refers to the same node, which is how reentrancies are
//! expressed. Edge labels containing `$` are nonterminals (`SYM$index`);
//! a missing index is filled in as `_<k>` in order of appearance. Every
//! top-level description adds a root.

use super::hypergraph::Hypergraph;
use super::label::EdgeLabel;
use crate::arena::NodeId;
use crate::error::{GraphError, GraphResult};
use std::collections::BTreeSet;

/// Parses a graph description.
pub fn parse(text: &str) -> GraphResult<Hypergraph> {
    let mut parser = DescriptionParser {
        text,
        pos: 0,
        graph: Hypergraph::new(),
        auto_index: 0,
    };
    parser.skip_ws();
    if parser.at_end() {
        return Err(parser.error("empty graph description"));
    }
    while !parser.at_end() {
        if parser.peek() != Some('(') {
            return Err(parser.error("expected '('"));
        }
        let root = parser.description()?;
        parser.graph.add_root(root)?;
        parser.skip_ws();
    }
    let mut graph = parser.graph;
    graph.name_anonymous_nodes();
    Ok(graph)
}

struct DescriptionParser<'a> {
    text: &'a str,
    pos: usize,
    graph: Hypergraph,
    auto_index: usize,
}

/// A node token split into its parts.
struct NodeToken<'a> {
    id: Option<&'a str>,
    label: Option<&'a str>,
    rank: Option<Option<u32>>,
}

impl<'a> DescriptionParser<'a> {
    fn error(&self, message: impl Into<String>) -> GraphError {
        GraphError::Syntax {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn word(&mut self) -> &'a str {
        let text = self.text;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || c == ':' {
                break;
            }
            self.pos += c.len_utf8();
        }
        &text[start..self.pos]
    }

    fn description(&mut self) -> GraphResult<NodeId> {
        // consume '('
        self.pos += 1;
        self.skip_ws();
        let node = match self.peek() {
            Some(':') | Some(')') => self.graph.add_anonymous_node(None),
            None => return Err(self.error("unbalanced '('")),
            _ => {
                let start = self.pos;
                let token = self.word();
                self.node(token, start)?
            }
        };
        loop {
            self.skip_ws();
            match self.peek() {
                Some(')') => {
                    self.pos += 1;
                    return Ok(node);
                }
                Some(':') => self.edge(node)?,
                Some(_) => return Err(self.error("expected ':' or ')'")),
                None => return Err(self.error("unbalanced '('")),
            }
        }
    }

    fn edge(&mut self, source: NodeId) -> GraphResult<()> {
        // consume ':'
        self.pos += 1;
        let label_start = self.pos;
        let token = self.word();
        if token.is_empty() {
            return Err(self.error("empty edge label"));
        }
        let label = EdgeLabel::from_token(token, &mut self.auto_index).ok_or_else(|| {
            GraphError::Syntax {
                offset: label_start,
                message: format!("malformed nonterminal label '{token}'"),
            }
        })?;
        let mut tails = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some('(') => tails.push(self.description()?),
                Some(':') | Some(')') | None => break,
                Some(_) => {
                    let start = self.pos;
                    let token = self.word();
                    tails.push(self.node(token, start)?);
                }
            }
        }
        self.graph.add_edge(source, label, tails)
    }

    fn node(&mut self, token: &'a str, offset: usize) -> GraphResult<NodeId> {
        let parsed = split_node_token(token).ok_or_else(|| GraphError::Syntax {
            offset,
            message: format!("malformed node '{token}'"),
        })?;
        let id = match parsed.id {
            Some(name) => self.graph.add_node(name, parsed.label),
            None => self.graph.add_anonymous_node(parsed.label),
        };
        if let Some(rank) = parsed.rank {
            let rank = rank.unwrap_or(self.graph.external_count() as u32);
            self.graph.set_external(id, rank)?;
        }
        Ok(id)
    }
}

fn split_node_token(token: &str) -> Option<NodeToken<'_>> {
    let (head, rank) = match token.rfind('*') {
        Some(star) => {
            let digits = &token[star + 1..];
            let rank = if digits.is_empty() {
                None
            } else if digits.chars().all(|c| c.is_ascii_digit()) {
                Some(digits.parse().ok()?)
            } else {
                return None;
            };
            (&token[..star], Some(rank))
        }
        None => (token, None),
    };
    let (id, label) = match head.find('.') {
        Some(dot) => (&head[..dot], &head[dot + 1..]),
        None => ("", head),
    };
    Some(NodeToken {
        id: (!id.is_empty()).then_some(id),
        label: (!label.is_empty()).then_some(label),
        rank,
    })
}

/// Serializes a graph to the description format.
///
/// Every root starts a top-level description. Nodes no root reaches start
/// further descriptions, in node allocation order.
pub fn serialize(graph: &Hypergraph, node_ids: bool) -> String {
    let tops = top_level_nodes(graph);
    let mut printed_ids: BTreeSet<NodeId> = graph.reentrant_nodes();
    for &top in &tops {
        if graph.in_degree(top) > 0 {
            printed_ids.insert(top);
        }
    }
    let mut writer = Writer {
        graph,
        node_ids,
        printed_ids,
        expanded: BTreeSet::new(),
    };
    let parts: Vec<String> = tops
        .iter()
        .map(|&root| {
            if writer.expanded.contains(&root) {
                format!("({})", writer.reference(root))
            } else {
                writer.expanded.insert(root);
                writer.expand(root, 0)
            }
        })
        .collect();
    parts.join(" ")
}

/// Roots, then the first node in allocation order that nothing printed so
/// far reaches, until every node is covered.
fn top_level_nodes(graph: &Hypergraph) -> Vec<NodeId> {
    let mut tops: Vec<NodeId> = graph.roots().to_vec();
    let mut covered: BTreeSet<NodeId> = BTreeSet::new();
    for &root in &tops {
        covered.extend(graph.reach(root));
    }
    for node in graph.node_ids() {
        if covered.contains(&node) {
            continue;
        }
        covered.extend(graph.reach(node));
        tops.push(node);
    }
    tops
}

struct Writer<'g> {
    graph: &'g Hypergraph,
    node_ids: bool,
    printed_ids: BTreeSet<NodeId>,
    expanded: BTreeSet<NodeId>,
}

impl Writer<'_> {
    fn shows_id(&self, node: NodeId) -> bool {
        self.node_ids || self.printed_ids.contains(&node)
    }

    fn reference(&self, node: NodeId) -> String {
        format!("{}.", self.graph.node_name(node))
    }

    fn first_hit(&self, node: NodeId) -> String {
        let mut token = String::new();
        let label = self.graph.node_label(node);
        if self.shows_id(node) {
            token.push_str(self.graph.node_name(node));
            token.push('.');
        } else if label.is_none() {
            token.push('.');
        }
        if let Some(label) = label {
            token.push_str(label);
        }
        if let Some(rank) = self.graph.external_rank(node) {
            token.push('*');
            token.push_str(&rank.to_string());
        }
        token
    }

    /// Prints `node` with all its outgoing edges, wrapped in parentheses.
    fn expand(&mut self, node: NodeId, depth: usize) -> String {
        let mut out = format!("({}", self.first_hit(node));
        let mut edges: Vec<_> = self.graph.out_edges(node).collect();
        edges.sort_by_key(|t| (!t.label.is_nonterminal(), t.label.to_string()));
        for triple in edges {
            out.push('\n');
            out.push_str(&"\t".repeat(depth + 1));
            out.push(':');
            out.push_str(&triple.label.to_string());
            for &tail in &triple.tails {
                out.push(' ');
                if self.expanded.insert(tail) {
                    if self.graph.out_edges(tail).next().is_some() {
                        out.push_str(&self.expand(tail, depth + 1));
                    } else {
                        out.push_str(&self.first_hit(tail));
                    }
                } else {
                    out.push_str(&self.reference(tail));
                }
            }
        }
        out.push(')');
        out
    }
}
