//! Ask-vs-design decision policy
//!
//! Computes EDR (expected design risk), a [0,1] scalar over the debate
//! state, and gates the route: asking is only justified when uncertainty is
//! high AND there is a question expected to meaningfully reduce it. High
//! uncertainty with nothing useful to ask routes to DESIGN.

use crate::state::DebateState;
use crate::types::{DecisionOutput, RankedQuestion, Route};
use serde::{Deserialize, Serialize};

/// Learnable EDR coefficients plus the evaluator's calibration scale.
///
/// Process-wide state: loaded once at start from the weights file and
/// rewritten wholesale after every recorded outcome. `domain_edge_cases` has
/// no weight of its own; it folds into the scope term via max.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyWeights {
    pub risk_mean: f64,
    pub scope: f64,
    pub workload: f64,
    pub compliance: f64,
    pub data_quality: f64,
    pub third_party: f64,
    /// Online-calibrated multiplier for scaled EDR, clamped to [0.5, 1.5].
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for PolicyWeights {
    fn default() -> Self {
        Self {
            risk_mean: 0.35,
            scope: 0.25,
            workload: 0.15,
            compliance: 0.10,
            data_quality: 0.10,
            third_party: 0.05,
            scale: 1.0,
        }
    }
}

/// The ask/design gate with its thresholds.
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    pub weights: PolicyWeights,
    pub ask_threshold: f64,
    pub ig_threshold: f64,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::new(PolicyWeights::default())
    }
}

impl DecisionPolicy {
    pub fn new(weights: PolicyWeights) -> Self {
        Self {
            weights,
            ask_threshold: 0.55,
            ig_threshold: 0.15,
        }
    }

    /// Expected design risk over the current debate state, clamped to [0,1].
    pub fn compute_edr(&self, state: &DebateState) -> f64 {
        let w = &self.weights;
        let scope_like = state
            .uncertainty_of("scope")
            .max(state.uncertainty_of("domain_edge_cases"));
        let edr = w.risk_mean * state.risk_mean
            + w.scope * scope_like
            + w.workload * state.uncertainty_of("workload")
            + w.compliance * state.uncertainty_of("compliance")
            + w.data_quality * state.uncertainty_of("data_quality")
            + w.third_party * state.uncertainty_of("third_party");
        edr.clamp(0.0, 1.0)
    }

    /// Route the run: ASK with the top three questions, or DESIGN.
    ///
    /// `ig_star` is the top question's information-gain score (0 with no
    /// questions). Both `edr` and `ig_star` are always attached to the
    /// output.
    pub fn decide(&self, state: &DebateState, ranked: &[RankedQuestion]) -> DecisionOutput {
        let edr = self.compute_edr(state);
        let ig_star = ranked.first().map(|r| r.ig).unwrap_or(0.0);

        if edr > self.ask_threshold && ig_star >= self.ig_threshold {
            DecisionOutput {
                route: Route::Ask,
                reason: format!("EDR={edr:.2}, IG*={ig_star:.2} -> Ask for high information gain"),
                questions: ranked.iter().take(3).map(|r| r.q.clone()).collect(),
                edr,
                ig_star,
                c4_containers: Vec::new(),
                adrs: Vec::new(),
                non_functionals: Default::default(),
                risks: Vec::new(),
                open_questions: Vec::new(),
            }
        } else {
            DecisionOutput {
                route: Route::Design,
                reason: format!(
                    "EDR={edr:.2}, IG*={ig_star:.2} -> Confident enough to propose a design"
                ),
                questions: Vec::new(),
                edr,
                ig_star,
                c4_containers: Vec::new(),
                adrs: Vec::new(),
                non_functionals: Default::default(),
                risks: Vec::new(),
                open_questions: Vec::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn bare_state() -> DebateState {
        let mut state = DebateState::new();
        for v in state.uncertainty.values_mut() {
            *v = 0.0;
        }
        state
    }

    fn question(q: &str, ig: f64) -> RankedQuestion {
        RankedQuestion {
            q: q.to_string(),
            ig,
            delta_u: BTreeMap::new(),
            delta_risk: 0.0,
            agent: "test".to_string(),
        }
    }

    #[test]
    fn edr_matches_hand_computed_value() {
        let mut state = bare_state();
        state.risk_mean = 0.8;
        state.uncertainty.insert("scope".to_string(), 0.9);

        let policy = DecisionPolicy::default();
        // 0.35*0.8 + 0.25*0.9 = 0.505
        assert!((policy.compute_edr(&state) - 0.505).abs() < 1e-9);
    }

    #[test]
    fn edr_is_always_in_unit_interval() {
        let policy = DecisionPolicy::default();
        let mut state = DebateState::new();
        state.risk_mean = 50.0;
        for v in state.uncertainty.values_mut() {
            *v = 1.0;
        }
        assert!(policy.compute_edr(&state) <= 1.0);

        state.risk_mean = -50.0;
        for v in state.uncertainty.values_mut() {
            *v = 0.0;
        }
        assert!(policy.compute_edr(&state) >= 0.0);
    }

    #[test]
    fn high_edr_with_useful_question_asks() {
        let mut state = bare_state();
        state.risk_mean = 1.0;
        state.uncertainty.insert("scope".to_string(), 1.0);
        // edr = 0.35 + 0.25 = 0.60 > 0.55

        let policy = DecisionPolicy::default();
        let ranked = vec![
            question("Peak RPS?", 0.20),
            question("Residency?", 0.18),
            question("RTO?", 0.12),
            question("Offline?", 0.05),
        ];
        let out = policy.decide(&state, &ranked);
        assert_eq!(out.route, Route::Ask);
        assert_eq!(out.questions.len(), 3);
        assert_eq!(out.questions[0], "Peak RPS?");
        assert!((out.edr - 0.60).abs() < 1e-9);
        assert!((out.ig_star - 0.20).abs() < 1e-9);
    }

    #[test]
    fn high_edr_without_useful_question_designs() {
        let mut state = bare_state();
        state.risk_mean = 1.0;
        state.uncertainty.insert("scope".to_string(), 1.0);

        let policy = DecisionPolicy::default();
        let out = policy.decide(&state, &[question("Anything?", 0.05)]);
        assert_eq!(out.route, Route::Design);
        assert!(out.questions.is_empty());
        assert!((out.ig_star - 0.05).abs() < 1e-9);
    }

    #[test]
    fn no_questions_means_zero_ig_star() {
        let policy = DecisionPolicy::default();
        let out = policy.decide(&bare_state(), &[]);
        assert_eq!(out.route, Route::Design);
        assert_eq!(out.ig_star, 0.0);
    }
}
