//! Grammar file reader.
//!
//! One rule is `LHS -> RHS1 [| RHS2] ; weight`. A rule may span several
//! lines: text is buffered until a line containing `;` is read. `#` starts a
//! comment that runs to the end of the line. An empty weight means
//! probability 1 (log-probability `0.0`).

use super::rule::{Rhs, RhsFormat, Rule, RuleId};
use super::{Grammar, GrammarOptions};
use crate::error::{GrammarError, GrammarErrorKind, GrammarResult};
use crate::graph::Hypergraph;
use std::io::BufRead;
use std::path::Path;

impl Grammar {
    /// Reads a grammar from text.
    pub fn load_from_str(text: &str, options: GrammarOptions) -> GrammarResult<Self> {
        let mut loader = Loader::new(options);
        for line in text.lines() {
            loader.feed(line)?;
        }
        loader.finish()
    }

    /// Reads a grammar from any buffered reader.
    pub fn load_from_reader<R: BufRead>(reader: R, options: GrammarOptions) -> GrammarResult<Self> {
        let mut loader = Loader::new(options);
        for line in reader.lines() {
            loader.feed(&line?)?;
        }
        loader.finish()
    }

    /// Reads a grammar file.
    pub fn load_from_file(path: impl AsRef<Path>, options: GrammarOptions) -> GrammarResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::load_from_reader(std::io::BufReader::new(file), options)
    }
}

struct Loader {
    options: GrammarOptions,
    rules: Vec<Rule>,
    buffer: String,
    line: usize,
    synchronous: Option<bool>,
    rhs1_format: Option<RhsFormat>,
    rhs2_format: Option<RhsFormat>,
}

impl Loader {
    fn new(options: GrammarOptions) -> Self {
        Self {
            options,
            rules: Vec::new(),
            buffer: String::new(),
            line: 0,
            synchronous: None,
            rhs1_format: None,
            rhs2_format: None,
        }
    }

    fn rule_number(&self) -> usize {
        self.rules.len() + 1
    }

    fn fail(&self, kind: GrammarErrorKind) -> GrammarError {
        GrammarError::Rule {
            line: self.line,
            rule: self.rule_number(),
            kind,
        }
    }

    fn feed(&mut self, raw: &str) -> GrammarResult<()> {
        self.line += 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        let content = match trimmed.split_once('#') {
            Some((content, _comment)) => content.trim(),
            None => trimmed,
        };
        if !self.buffer.is_empty() && !content.is_empty() {
            self.buffer.push(' ');
        }
        self.buffer.push_str(content);
        if content.contains(';') {
            let rule_text = std::mem::take(&mut self.buffer);
            let rule = self.read_rule(&rule_text).map_err(|kind| self.fail(kind))?;
            self.rules.push(rule);
        }
        Ok(())
    }

    fn finish(self) -> GrammarResult<Grammar> {
        if !self.buffer.trim().is_empty() {
            return Err(self.fail(GrammarErrorKind::NearEndOfLine));
        }
        let synchronous = self.synchronous.unwrap_or(false);
        let (rhs1_format, rhs2_format) = if synchronous && self.options.reverse {
            (self.rhs2_format, self.rhs1_format)
        } else {
            (self.rhs1_format, self.rhs2_format)
        };
        Grammar::from_rules(self.rules, self.options)
            .map(|g| g.with_formats(synchronous, rhs1_format, rhs2_format))
    }

    fn read_rule(&mut self, text: &str) -> Result<Rule, GrammarErrorKind> {
        let (body, weight_text) = text.split_once(';').ok_or(GrammarErrorKind::NearEndOfLine)?;
        let weight_text = weight_text.trim();
        let weight = if weight_text.is_empty() {
            0.0
        } else {
            let w: f64 = weight_text
                .parse()
                .map_err(|_| GrammarErrorKind::NearEndOfLine)?;
            if self.options.log_prob {
                w
            } else {
                w.ln()
            }
        };

        let mut sides = body.split("->");
        let (lhs, rhs_text) = match (sides.next(), sides.next(), sides.next()) {
            (Some(lhs), Some(rhs), None) => (lhs.trim(), rhs),
            _ => return Err(GrammarErrorKind::InvalidFormat),
        };
        if lhs.is_empty() {
            return Err(GrammarErrorKind::InvalidFormat);
        }

        let parts: Vec<&str> = rhs_text.split('|').collect();
        let is_synchronous = match parts.len() {
            1 => false,
            2 => true,
            _ => return Err(GrammarErrorKind::TooManyRhs),
        };
        match self.synchronous {
            Some(previous) if previous != is_synchronous => {
                return Err(GrammarErrorKind::MixedSynchronous)
            }
            _ => self.synchronous = Some(is_synchronous),
        }

        let rhs1 = read_rhs(parts[0], &mut self.rhs1_format)?;
        let rhs2 = if is_synchronous {
            let rhs2 = read_rhs(parts[1], &mut self.rhs2_format)?;
            let (nts1, nts2) = (rhs1.nonterminals(), rhs2.nonterminals());
            if nts1 != nts2 {
                let render = |set: &std::collections::BTreeSet<crate::graph::NonterminalLabel>| {
                    set.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
                };
                return Err(GrammarErrorKind::NonterminalMismatch {
                    rhs1: format!("{{{}}}", render(&nts1)),
                    rhs2: format!("{{{}}}", render(&nts2)),
                });
            }
            Some(rhs2)
        } else {
            None
        };

        let id = RuleId::new(self.rule_number() as u32);
        let mut rule = match rhs2 {
            Some(rhs2) if self.options.reverse => Rule::new(id, lhs, weight, rhs2, Some(rhs1))?,
            rhs2 => Rule::new(id, lhs, weight, rhs1, rhs2)?,
        };
        rule.log_prob = self.options.log_prob;
        Ok(rule)
    }
}

/// Reads one right-hand side.
///
/// Until the format is known a graph description is tried first and a token
/// string is the fallback. Once the first right-hand side was read as a graph,
/// unparseable graphs are errors.
fn read_rhs(text: &str, format: &mut Option<RhsFormat>) -> Result<Rhs, GrammarErrorKind> {
    let text = text.trim();
    if *format != Some(RhsFormat::String) {
        match Hypergraph::from_string(text) {
            Ok(graph) => {
                format.get_or_insert(RhsFormat::Hypergraph);
                return Ok(Rhs::graph_rhs(graph));
            }
            Err(e) if *format == Some(RhsFormat::Hypergraph) => {
                return Err(GrammarErrorKind::Graph(e));
            }
            Err(_) => {}
        }
    }
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let chain = Hypergraph::from_tokens(&tokens).map_err(GrammarErrorKind::Graph)?;
    *format = Some(RhsFormat::String);
    Ok(Rhs::string_rhs(chain))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPH_GRAMMAR: &str = "\
# toy grammar
S -> (. :A$1 (.*0) :B$2 .*1) ; 0.5
A -> (. :a .*0) ;
B -> (. :b
      .*0) ; 0.25   # wrapped across lines
";

    #[test]
    fn loads_graph_grammar() {
        let g = Grammar::load_from_str(GRAPH_GRAMMAR, GrammarOptions::default()).unwrap();
        assert_eq!(g.len(), 3);
        assert_eq!(g.start_symbol(), "S");
        assert_eq!(g.rhs1_format(), Some(RhsFormat::Hypergraph));
        assert!(!g.is_synchronous());
        let s = g.get(RuleId::new(1)).unwrap();
        assert!((s.weight - 0.5f64.ln()).abs() < 1e-12);
        assert_eq!(g.get(RuleId::new(2)).unwrap().weight, 0.0);
        let b = g.get(RuleId::new(3)).unwrap();
        assert_eq!(b.symbol, "B");
        assert_eq!(b.rhs1.graph().edge_count(), 1);
    }

    #[test]
    fn log_prob_mode_keeps_weights() {
        let text = "S -> (. :a .*0) ; -2.5\n";
        let options = GrammarOptions::default().with_log_prob(true);
        let g = Grammar::load_from_str(text, options).unwrap();
        assert_eq!(g.get(RuleId::new(1)).unwrap().weight, -2.5);
    }

    #[test]
    fn string_grammar_falls_back_to_tokens() {
        let text = "S -> NP$ VP$ ;\nNP -> the dog ;\nVP -> barks ;\n";
        let g = Grammar::load_from_str(text, GrammarOptions::default()).unwrap();
        assert_eq!(g.rhs1_format(), Some(RhsFormat::String));
        let s = g.get(RuleId::new(1)).unwrap();
        assert_eq!(s.rhs1.to_string(), "NP$_0 VP$_1");
        assert_eq!(s.external_arity(), 1);
    }

    #[test]
    fn synchronous_and_reverse() {
        let text = "S -> (. :X$1 .*0) | a X$1 ;\nX -> (. :y .*0) | b ;\n";
        let g = Grammar::load_from_str(text, GrammarOptions::default()).unwrap();
        assert!(g.is_synchronous());
        assert_eq!(g.rhs1_format(), Some(RhsFormat::Hypergraph));
        assert_eq!(g.rhs2_format(), Some(RhsFormat::String));

        let rev = Grammar::load_from_str(text, GrammarOptions::default().with_reverse(true)).unwrap();
        assert_eq!(rev.rhs1_format(), Some(RhsFormat::String));
        let s = rev.get(RuleId::new(1)).unwrap();
        assert_eq!(s.rhs1.to_string(), "a X$1");
    }

    fn rule_error(text: &str) -> (usize, usize, GrammarErrorKind) {
        match Grammar::load_from_str(text, GrammarOptions::default()) {
            Err(GrammarError::Rule { line, rule, kind }) => (line, rule, kind),
            other => panic!("expected rule error, got {other:?}"),
        }
    }

    #[test]
    fn error_cases_carry_line_and_rule() {
        assert_eq!(
            rule_error("S -> (. :a .) ; 0.5\nA (. :b .) ;\n"),
            (2, 2, GrammarErrorKind::InvalidFormat)
        );
        assert_eq!(rule_error("S -> (. :a .) ; abc\n").2, GrammarErrorKind::NearEndOfLine);
        assert_eq!(rule_error("S -> a | b | c ;\n").2, GrammarErrorKind::TooManyRhs);
        assert_eq!(
            rule_error("S -> (. :a .) | x ;\nA -> (. :b .) ;\n").2,
            GrammarErrorKind::MixedSynchronous
        );
        assert!(matches!(
            rule_error("S -> (. :a .) ;\nA -> (. :b ;\n").2,
            GrammarErrorKind::Graph(_)
        ));
        assert!(matches!(
            rule_error("S -> (. :X$1 .*0) | Y$1 ;\n").2,
            GrammarErrorKind::NonterminalMismatch { .. }
        ));
        assert_eq!(
            rule_error("S -> (. :a .)\n").2,
            GrammarErrorKind::NearEndOfLine
        );
    }

    #[test]
    fn empty_grammar_is_an_error() {
        let err = Grammar::load_from_str("# nothing\n\n", GrammarOptions::default()).unwrap_err();
        assert!(matches!(err, GrammarError::Empty));
    }

    #[test]
    fn load_from_file_reads_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toy.hrg");
        std::fs::write(&path, GRAPH_GRAMMAR).unwrap();
        let g = Grammar::load_from_file(&path, GrammarOptions::default()).unwrap();
        assert_eq!(g.len(), 3);
        assert!(matches!(
            Grammar::load_from_file(dir.path().join("missing"), GrammarOptions::default()),
            Err(GrammarError::Io(_))
        ));
    }
}
