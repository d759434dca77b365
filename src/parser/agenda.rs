//! FIFO agenda of chart items.
//!
//! The agenda keeps a pending set mirroring the queue and a visited set of
//! everything ever popped. Newly derived items are enqueued only if they are
//! neither pending nor visited; waiting items woken by a closed item are
//! re-enqueued whenever they are not pending, even if visited before.

use crate::item::ItemRef;
use std::collections::{HashSet, VecDeque};

/// Breadth-first worklist of chart items.
#[derive(Debug, Default)]
pub struct Agenda {
    queue: VecDeque<ItemRef>,
    pending: HashSet<ItemRef>,
    visited: HashSet<ItemRef>,
    max_len: usize,
}

impl Agenda {
    /// Creates an empty agenda.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a newly derived item.
    ///
    /// Returns `false` if the item is already pending or was visited.
    pub fn push(&mut self, item: ItemRef) -> bool {
        if self.pending.contains(&item) || self.visited.contains(&item) {
            return false;
        }
        self.enqueue(item);
        true
    }

    /// Enqueues a waiting item again so it can retry completion.
    ///
    /// Returns `false` if the item is already pending.
    pub fn requeue(&mut self, item: ItemRef) -> bool {
        if self.pending.contains(&item) {
            return false;
        }
        self.enqueue(item);
        true
    }

    fn enqueue(&mut self, item: ItemRef) {
        self.pending.insert(item.clone());
        self.queue.push_back(item);
        self.max_len = self.max_len.max(self.queue.len());
    }

    /// Pops the oldest item and marks it visited.
    pub fn pop(&mut self) -> Option<ItemRef> {
        let item = self.queue.pop_front()?;
        self.pending.remove(&item);
        self.visited.insert(item.clone());
        Some(item)
    }

    /// Items waiting.
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if nothing is waiting.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Longest the queue has been.
    #[inline]
    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Rhs, Rule, RuleId};
    use crate::graph::Hypergraph;
    use crate::item::HergItem;
    use std::sync::Arc;

    fn axiom(id: u32) -> ItemRef {
        let graph = Hypergraph::from_string("(. :a .*0)").unwrap();
        let rule = Rule::new(RuleId::new(id), "A", 0.0, Rhs::graph_rhs(graph), None).unwrap();
        Arc::new(HergItem::axiom(Arc::new(rule), false))
    }

    #[test]
    fn fifo_order() {
        let mut agenda = Agenda::new();
        for id in [3, 1, 2] {
            assert!(agenda.push(axiom(id)));
        }
        let popped: Vec<u32> = std::iter::from_fn(|| agenda.pop())
            .map(|item| item.rule_id().as_u32())
            .collect();
        assert_eq!(popped, vec![3, 1, 2]);
        assert_eq!(agenda.max_len(), 3);
        assert!(agenda.is_empty());
    }

    #[test]
    fn push_skips_pending_and_visited_but_requeue_does_not() {
        let mut agenda = Agenda::new();
        let item = axiom(1);
        assert!(agenda.push(item.clone()));
        assert!(!agenda.push(axiom(1)), "pending");
        assert!(!agenda.requeue(item.clone()), "pending");
        agenda.pop();
        assert!(!agenda.push(item.clone()), "visited");
        assert!(agenda.requeue(item));
        assert_eq!(agenda.len(), 1);
    }
}
