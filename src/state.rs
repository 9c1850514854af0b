//! Per-run debate state
//!
//! One [`DebateState`] is created fresh per decision run and discarded at the
//! end. It aggregates the panel's risk scores and the per-dimension
//! uncertainty map the policy reads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The nine tracked uncertainty dimensions and their starting values.
const STARTING_UNCERTAINTY: [(&str, f64); 9] = [
    ("scope", 0.4),
    ("workload", 0.4),
    ("compliance", 0.3),
    ("data_quality", 0.3),
    ("latency", 0.3),
    ("cost", 0.3),
    ("user_journeys", 0.3),
    ("third_party", 0.3),
    ("domain_edge_cases", 0.4),
];

/// Running risk/uncertainty aggregate for one decision run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateState {
    /// Per-dimension uncertainty in [0,1]. The nine tracked dimensions are
    /// always present; updates may introduce extra dimensions, which start
    /// from 0.0.
    pub uncertainty: BTreeMap<String, f64>,
    /// Risk recurrence `(mean + new) / 2`, seeded by the primary framer.
    /// Later scorecards dominate; this is deliberate, not an average.
    pub risk_mean: f64,
    /// Running maximum risk score across the panel.
    pub risk_max: f64,
}

impl Default for DebateState {
    fn default() -> Self {
        Self::new()
    }
}

impl DebateState {
    pub fn new() -> Self {
        Self {
            uncertainty: STARTING_UNCERTAINTY
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            risk_mean: 0.0,
            risk_max: 0.0,
        }
    }

    /// Apply a sequence of uncertainty updates in arrival order.
    ///
    /// Each individual delta is clamped to [0,1] before the next update is
    /// applied, so merging is path-dependent: it is NOT equivalent to summing
    /// all deltas and clamping once. Callers must not batch or reorder.
    pub fn merge_uncertainty(&mut self, updates: &[BTreeMap<String, f64>]) {
        for update in updates {
            for (dim, delta) in update {
                let current = self.uncertainty.get(dim).copied().unwrap_or(0.0);
                self.uncertainty
                    .insert(dim.clone(), (current + delta).clamp(0.0, 1.0));
            }
        }
    }

    pub fn uncertainty_of(&self, dim: &str) -> f64 {
        self.uncertainty.get(dim).copied().unwrap_or(0.0)
    }
}
