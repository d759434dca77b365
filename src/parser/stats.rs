//! Parse diagnostics.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counters collected during one parse.
///
/// The growth counters record the largest number of items a single
/// transition of each kind added to the agenda.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseStats {
    /// Agenda pops.
    pub steps: usize,
    /// Longest the agenda queue has been.
    pub max_queue_size: usize,
    /// Largest wake-up of waiting items after a closed item.
    pub max_growth_wakeup: usize,
    /// Largest growth from completing one open item.
    pub max_growth_complete: usize,
    /// Largest growth from shifting one open item.
    pub max_growth_shift: usize,
    /// Rules left after reachability filtering.
    pub reachable_rules: usize,
    /// Edges in the input graph.
    pub input_edges: usize,
    /// START productions recorded.
    pub accepted: usize,
    /// The loop stopped on the step ceiling.
    pub truncated: bool,
    /// Wall time of the agenda loop.
    pub elapsed: Duration,
}
