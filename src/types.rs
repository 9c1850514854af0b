//! Core data contracts for the architecture decision council
//!
//! Everything the components exchange lives here: the problem brief going in,
//! the scorecards the expert panel produces, and the routing decision coming
//! out. These shapes are also what the trace log and telemetry store persist,
//! so every type is serde-serializable.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The structured input describing an architecture problem.
///
/// `constraints` grows monotonically as clarification answers are ingested;
/// nothing ever removes a key from it during a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProblemBrief {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub constraints: BTreeMap<String, Value>,
    #[serde(default)]
    pub must_haves: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub timelines: BTreeMap<String, Value>,
    #[serde(default)]
    pub known_risks: Vec<String>,
    #[serde(default)]
    pub unknowns: Vec<String>,
}

impl ProblemBrief {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Default::default()
        }
    }
}

/// A clarifying question a reasoner would like answered, with its expected
/// effect on uncertainty dimensions and overall risk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionCandidate {
    pub q: String,
    #[serde(default, rename = "expected_delta_U")]
    pub expected_delta_u: BTreeMap<String, f64>,
    #[serde(default)]
    pub expected_delta_risk: f64,
}

/// A decision point a reasoner surfaced, with its recommendation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyDecision {
    pub topic: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub recommend: String,
    #[serde(default)]
    pub rationale: String,
}

/// A concrete design change a reasoner proposes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesignDelta {
    pub change: String,
    #[serde(default)]
    pub impact: String,
    #[serde(default)]
    pub cost: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// One reasoner's structured assessment of a problem brief.
///
/// Produced once per agent per round and immutable afterward. `risk_score`
/// is in [0,1]; `uncertainty_updates` values are deltas in [-1,1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scorecard {
    pub agent: String,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub key_decisions: Vec<KeyDecision>,
    #[serde(default)]
    pub question_candidates: Vec<QuestionCandidate>,
    #[serde(default)]
    pub design_deltas: Vec<DesignDelta>,
    #[serde(default)]
    pub risk_score: f64,
    #[serde(default)]
    pub uncertainty_updates: BTreeMap<String, f64>,
    #[serde(default)]
    pub rationale_summary: Option<String>,
}

impl Scorecard {
    /// The canonical empty scorecard every absent field backfills from.
    pub fn empty(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            assumptions: Vec::new(),
            concerns: Vec::new(),
            blockers: Vec::new(),
            key_decisions: Vec::new(),
            question_candidates: Vec::new(),
            design_deltas: Vec::new(),
            risk_score: 0.0,
            uncertainty_updates: BTreeMap::new(),
            rationale_summary: None,
        }
    }
}

/// A question with its information-gain score, after flattening every
/// scorecard's candidates and sorting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedQuestion {
    pub q: String,
    pub ig: f64,
    #[serde(rename = "delta_U")]
    pub delta_u: BTreeMap<String, f64>,
    pub delta_risk: f64,
    pub agent: String,
}

/// Which way the policy routed the run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Route {
    /// More clarification needed before designing
    Ask,
    /// Confident enough to synthesize a candidate design
    Design,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Ask => "ASK",
            Route::Design => "DESIGN",
        }
    }
}

/// A container in the composed candidate design (C4 level).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub responsibility: String,
    pub meta: ContainerMeta,
}

/// Where a container came from and how the composer scored it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerMeta {
    pub agent: String,
    pub confidence: Option<f64>,
    pub score: f64,
}

/// An architecture decision record emitted per winning proposal cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adr {
    pub id: String,
    pub title: String,
    pub status: String,
    pub reason: String,
}

/// The final routing result of one decision run.
///
/// `questions` is populated only on ASK; the design artifact fields
/// (`c4_containers`, `adrs`, `non_functionals`, `risks`, `open_questions`)
/// only on DESIGN. `edr` and `ig_star` are always attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionOutput {
    pub route: Route,
    pub reason: String,
    #[serde(default)]
    pub questions: Vec<String>,
    pub edr: f64,
    pub ig_star: f64,
    #[serde(default)]
    pub c4_containers: Vec<Container>,
    #[serde(default)]
    pub adrs: Vec<Adr>,
    #[serde(default)]
    pub non_functionals: BTreeMap<String, Value>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
}

/// Per-run context shared with every reasoner call.
///
/// Accumulates the user's clarification answers and the structured hints the
/// normalizer derived from them. Rendered into remote prompts verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunContext {
    #[serde(default)]
    pub user_answers: BTreeMap<String, String>,
    #[serde(default)]
    pub derived: BTreeMap<String, Value>,
}

/// The derived non-functional hint keys the composer surfaces.
pub const NON_FUNCTIONAL_KEYS: [&str; 6] = [
    "p95_latency_ms",
    "peak_rps",
    "RTO_s",
    "RPO_s",
    "residency",
    "consistency",
];
