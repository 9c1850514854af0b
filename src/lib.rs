//! design-council - Architecture Decision Council
//!
//! A panel of expert reasoners debates an architecture problem brief,
//! aggregates its findings into a debate state, and either asks the user
//! targeted clarifying questions or composes a candidate design, whichever
//! the expected-design-risk policy justifies. Outcomes recorded after the
//! fact calibrate the policy online.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use design_council::{
//!     agents::rule_panel, eval::Evaluator, facts::FactsStore,
//!     orchestrator::{Orchestrator, RunOptions}, policy::DecisionPolicy,
//!     trace::TraceLogger, types::ProblemBrief,
//! };
//!
//! let logger = TraceLogger::new("telemetry/traces.jsonl")?;
//! let orch = Orchestrator::new(DecisionPolicy::default(), rule_panel(), logger);
//!
//! let mut brief = ProblemBrief::new("Payments Service", "subscriptions across US/EU");
//! let mut facts = FactsStore::open("telemetry/facts.json")?;
//! let decision = orch.run(&mut brief, &mut facts, None, &RunOptions::default())?;
//!
//! // Record the outcome later (the learning loop)
//! let eval = Evaluator::open("telemetry/council.db", "telemetry/weights.json")?;
//! let id = eval.log_decision(&brief.title, &decision, &serde_json::json!({}))?;
//! eval.log_outcome(&id, false, 0, 0.9, true)?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! ProblemBrief
//!     │
//!     ▼
//! Orchestrator ──▶ Reasoner panel (rule-based or LLM-backed) ──▶ Scorecards
//!     │                                                              │
//!     ▼                                                              ▼
//! DebateState merge ──▶ DecisionPolicy (EDR gate) ──▶ ASK ──▶ AnswerNormalizer ─┐
//!     ▲                                    │                                    │
//!     └────────────────────────────────────┼────────────────────────────────────┘
//!                                          ▼
//!                                       DESIGN ──▶ Design composer ──▶ DecisionOutput
//!                                                                          │
//!                                                                          ▼
//!                                                       Evaluator (telemetry + calibration)
//! ```

pub mod agents;
pub mod answers;
pub mod compose;
pub mod decode;
pub mod eval;
pub mod facts;
pub mod llm;
pub mod orchestrator;
pub mod policy;
pub mod state;
pub mod trace;
pub mod types;

// Core entry points
pub use agents::{rule_panel, remote_panel, Reasoner};
pub use eval::Evaluator;
pub use facts::FactsStore;
pub use orchestrator::{ClarificationChannel, ConsoleChannel, Orchestrator, RunOptions};
pub use policy::{DecisionPolicy, PolicyWeights};
pub use trace::TraceLogger;
pub use types::{DecisionOutput, ProblemBrief, Route, Scorecard};
