//! Parser configuration.

use serde::{Deserialize, Serialize};

/// What to do when a step ceiling is hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetPolicy {
    /// Fail with [`crate::error::ParseError::BudgetExceeded`].
    #[default]
    Error,
    /// Keep the chart built so far and mark the stats as truncated.
    Truncate,
}

/// Settings for one [`super::Parser`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Maximum number of agenda pops. `None` runs to exhaustion.
    pub max_steps: Option<usize>,
    /// Stop as soon as the first full parse is found.
    pub stop_at_first: bool,
    /// Accept any closed start-symbol item, even if it leaves edges uncovered.
    pub partial: bool,
    /// Keep expansions that only differ in the order their children were found.
    pub permutations: bool,
    /// Behaviour when `max_steps` or `cky_max_steps` is reached.
    pub budget_policy: BudgetPolicy,
    /// Maximum number of pops in the CKY reachability scan.
    pub cky_max_steps: Option<usize>,
}

impl ParserConfig {
    /// Sets the agenda step ceiling.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Sets early stopping.
    #[must_use]
    pub fn with_stop_at_first(mut self, stop_at_first: bool) -> Self {
        self.stop_at_first = stop_at_first;
        self
    }

    /// Sets partial acceptance.
    #[must_use]
    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    /// Sets whether permuted expansions are kept.
    #[must_use]
    pub fn with_permutations(mut self, permutations: bool) -> Self {
        self.permutations = permutations;
        self
    }

    /// Sets the budget policy.
    #[must_use]
    pub fn with_budget_policy(mut self, budget_policy: BudgetPolicy) -> Self {
        self.budget_policy = budget_policy;
        self
    }

    /// Sets the CKY conversion step ceiling.
    #[must_use]
    pub fn with_cky_max_steps(mut self, cky_max_steps: Option<usize>) -> Self {
        self.cky_max_steps = cky_max_steps;
        self
    }
}
