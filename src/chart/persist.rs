//! CBOR persistence of CKY charts.
//!
//! Items are stored once in an item table and referenced by position. An item
//! record keeps the rule id and the item state; on load it is rebound to the
//! grammar's rule and checked against its stored fingerprint. The record also
//! keeps a fingerprint of every rule its items use, and loading fails unless
//! the grammar's rule with that id has the same fingerprint. Rules no item
//! uses are not checked.

use super::{ChartKey, CkyChart, Expansion, Slot};
use crate::error::PersistError;
use crate::fingerprint::HashValue;
use crate::grammar::{Grammar, RuleId};
use crate::graph::{EdgeId, NodeId};
use crate::item::{HergItem, ItemRef};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

const FORMAT_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct ItemRecord {
    rule_id: RuleId,
    size: usize,
    shifted: Vec<EdgeId>,
    mapping: Vec<(NodeId, NodeId)>,
    nodeset: Vec<NodeId>,
    node_labels: bool,
    fingerprint: HashValue,
}

impl ItemRecord {
    fn from_item(item: &HergItem) -> Self {
        Self {
            rule_id: item.rule_id(),
            size: item.size(),
            shifted: item.shifted().to_vec(),
            mapping: item.mapping().iter().map(|(&k, &v)| (k, v)).collect(),
            nodeset: item.nodeset().iter().copied().collect(),
            node_labels: item.node_labels(),
            fingerprint: item.fingerprint(),
        }
    }

    fn rebind(self, grammar: &Grammar) -> Result<ItemRef, PersistError> {
        let rule = grammar
            .get(self.rule_id)
            .ok_or(PersistError::UnknownRule(self.rule_id))?;
        let item = HergItem::from_parts(
            rule.clone(),
            self.size,
            self.shifted,
            self.mapping.into_iter().collect(),
            self.nodeset.into_iter().collect::<BTreeSet<_>>(),
            self.node_labels,
        )
        .ok_or_else(|| PersistError::InvalidItem {
            rule: self.rule_id,
            reason: "size or mapping does not fit the rule".to_string(),
        })?;
        if item.fingerprint() != self.fingerprint {
            return Err(PersistError::InvalidItem {
                rule: self.rule_id,
                reason: "fingerprint mismatch".to_string(),
            });
        }
        Ok(Arc::new(item))
    }
}

#[derive(Debug, Serialize, Deserialize)]
enum KeyRecord {
    Start,
    Item(usize),
}

#[derive(Debug, Serialize, Deserialize)]
struct ChartRecord {
    version: u32,
    rules: Vec<(RuleId, HashValue)>,
    items: Vec<ItemRecord>,
    entries: Vec<(KeyRecord, Vec<Vec<(Slot, usize)>>)>,
}

impl CkyChart {
    fn to_record(&self) -> ChartRecord {
        let mut table: IndexSet<ItemRef> = IndexSet::new();
        let mut intern = |item: &ItemRef| table.insert_full(item.clone()).0;
        let mut entries = Vec::with_capacity(self.len());
        for (key, expansions) in self.iter() {
            let key = match key {
                ChartKey::Start => KeyRecord::Start,
                ChartKey::Item(item) => KeyRecord::Item(intern(item)),
            };
            let expansions: Vec<Vec<(Slot, usize)>> = expansions
                .iter()
                .map(|expansion| {
                    expansion
                        .iter()
                        .map(|(slot, child)| (slot.clone(), intern(child)))
                        .collect()
                })
                .collect();
            entries.push((key, expansions));
        }
        let rules: BTreeMap<RuleId, HashValue> = table
            .iter()
            .map(|item| (item.rule_id(), item.rule().fingerprint()))
            .collect();
        ChartRecord {
            version: FORMAT_VERSION,
            rules: rules.into_iter().collect(),
            items: table.iter().map(|item| ItemRecord::from_item(item)).collect(),
            entries,
        }
    }

    /// Serializes the chart to CBOR bytes.
    pub fn to_cbor(&self) -> Result<Vec<u8>, PersistError> {
        Ok(serde_cbor::to_vec(&self.to_record())?)
    }

    /// Deserializes a chart and rebinds its items to `grammar`'s rules.
    pub fn from_cbor(bytes: &[u8], grammar: &Grammar) -> Result<Self, PersistError> {
        let record: ChartRecord = serde_cbor::from_slice(bytes)?;
        if record.version != FORMAT_VERSION {
            tracing::warn!(version = record.version, "loading chart with unexpected format version");
        }
        for (id, fingerprint) in &record.rules {
            let rule = grammar.get(*id).ok_or(PersistError::UnknownRule(*id))?;
            if rule.fingerprint() != *fingerprint {
                return Err(PersistError::RuleMismatch(*id));
            }
        }
        let items = record
            .items
            .into_iter()
            .map(|r| r.rebind(grammar))
            .collect::<Result<Vec<_>, _>>()?;
        let lookup = |index: usize| {
            items.get(index).cloned().ok_or_else(|| PersistError::InvalidItem {
                rule: RuleId::new(0),
                reason: format!("item index {index} out of range"),
            })
        };

        let mut chart = CkyChart::new();
        for (key, expansions) in record.entries {
            let key = match key {
                KeyRecord::Start => ChartKey::Start,
                KeyRecord::Item(index) => ChartKey::Item(lookup(index)?),
            };
            let expansions = expansions
                .into_iter()
                .map(|children| {
                    children
                        .into_iter()
                        .map(|(slot, index)| Ok((slot, lookup(index)?)))
                        .collect::<Result<Expansion, PersistError>>()
                })
                .collect::<Result<Vec<_>, _>>()?;
            chart.insert(key, expansions);
        }
        tracing::debug!(keys = chart.len(), items = items.len(), "loaded chart");
        Ok(chart)
    }

    /// Saves the chart to a file in CBOR format.
    pub fn save_to_file(&self, path: &Path) -> Result<(), PersistError> {
        let bytes = self.to_cbor()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Loads a chart saved with [`CkyChart::save_to_file`].
    pub fn load_from_file(path: &Path, grammar: &Grammar) -> Result<Self, PersistError> {
        let bytes = std::fs::read(path)?;
        Self::from_cbor(&bytes, grammar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::kbest::SearchConfig;
    use crate::grammar::GrammarOptions;
    use crate::graph::Hypergraph;
    use crate::parser::Parser;

    const GRAMMAR: &str = "\
S -> (. :A$1 .*0 :B$2 .*1) ; 0.5
A -> (. :a .*0) ; 0.5
A -> (. :C$1 .*0) ; 0.5
C -> (. :a .*0) ;
B -> (. :b .*0) ;
";

    fn parsed() -> (Grammar, CkyChart) {
        let g = Grammar::load_from_str(GRAMMAR, GrammarOptions::default()).unwrap();
        let input = Hypergraph::from_string("(x. :a y. :b z.)").unwrap();
        let (chart, _) = Parser::new(&g).parse_to_cky(&input).unwrap();
        (g, chart)
    }

    #[test]
    fn file_round_trip_preserves_items_and_derivations() {
        let (g, chart) = parsed();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.cbor");
        chart.save_to_file(&path).unwrap();
        let loaded = CkyChart::load_from_file(&path, &g).unwrap();

        assert_eq!(loaded.stats(), chart.stats());
        for key in chart.keys() {
            assert_eq!(loaded.get(key), chart.get(key));
        }
        let config = SearchConfig::default().with_k_best(None);
        let before: Vec<String> = chart
            .derivations(&config)
            .derivations
            .iter()
            .map(|d| d.derivation.format())
            .collect();
        let after: Vec<String> = loaded
            .derivations(&config)
            .derivations
            .iter()
            .map(|d| d.derivation.format())
            .collect();
        assert_eq!(before, after);
        assert_eq!(before.len(), 2);
    }

    #[test]
    fn loading_against_another_grammar_fails() {
        let (_, chart) = parsed();
        let bytes = chart.to_cbor().unwrap();
        let small = Grammar::load_from_str("S -> (. :a .*0) ;\n", GrammarOptions::default()).unwrap();
        assert!(matches!(
            CkyChart::from_cbor(&bytes, &small),
            Err(PersistError::UnknownRule(_)) | Err(PersistError::RuleMismatch(_))
        ));
        assert!(matches!(
            CkyChart::from_cbor(b"not cbor", &small),
            Err(PersistError::Cbor(_))
        ));
    }

    #[test]
    fn loading_against_a_changed_rule_fails() {
        let (_, chart) = parsed();
        let bytes = chart.to_cbor().unwrap();
        // Same ids and arities, different terminal in rule 4.
        let changed = GRAMMAR.replace("C -> (. :a .*0) ;", "C -> (. :z .*0) ;");
        let other = Grammar::load_from_str(&changed, GrammarOptions::default()).unwrap();
        assert!(matches!(
            CkyChart::from_cbor(&bytes, &other),
            Err(PersistError::RuleMismatch(id)) if id == RuleId::new(4)
        ));
        // A reweighted rule is a different rule too.
        let reweighted = GRAMMAR.replace("S -> (. :A$1 .*0 :B$2 .*1) ; 0.5", "S -> (. :A$1 .*0 :B$2 .*1) ; 0.25");
        let other = Grammar::load_from_str(&reweighted, GrammarOptions::default()).unwrap();
        assert!(matches!(
            CkyChart::from_cbor(&bytes, &other),
            Err(PersistError::RuleMismatch(_))
        ));
    }

    #[test]
    fn empty_chart_round_trips() {
        let (g, _) = parsed();
        let bytes = CkyChart::new().to_cbor().unwrap();
        assert!(CkyChart::from_cbor(&bytes, &g).unwrap().is_empty());
    }
}
