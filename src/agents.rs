//! The expert reasoner panel
//!
//! Rule-based and remote reasoners share exactly one capability: given a
//! brief and context, produce a [`Scorecard`]. That seam is the [`Reasoner`]
//! trait; the orchestrator never knows which variant it is driving.
//!
//! The rule-based panel is a set of lightweight offline stand-ins with
//! keyword-triggered concerns and canned question candidates. The remote
//! variant renders the brief, the user's clarifications, derived hints and
//! org facts into a role-parameterized prompt and decodes whatever comes
//! back with total defaulting.

use crate::decode::scorecard_from_text;
use crate::llm::{ChatClient, ChatMessage};
use crate::types::{
    DesignDelta, KeyDecision, ProblemBrief, QuestionCandidate, RunContext, Scorecard,
};
use anyhow::Result;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One expert on the panel. The first reasoner handed to the orchestrator is
/// the primary framer and must complete before the rest run.
pub trait Reasoner {
    fn name(&self) -> &str;

    fn analyze(
        &self,
        brief: &ProblemBrief,
        context: &RunContext,
        facts: &BTreeMap<String, Value>,
    ) -> Result<Scorecard>;
}

/// The expert roles the default panels cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpertRole {
    SystemsGeneralist,
    InfraReliability,
    DataIntegration,
    SecurityCompliance,
    FrontendMobile,
    Domain,
    /// Remote panel only; there is no offline stand-in for this role.
    MlAi,
}

impl ExpertRole {
    pub fn name(&self) -> &'static str {
        match self {
            ExpertRole::SystemsGeneralist => "SystemsGeneralist",
            ExpertRole::InfraReliability => "InfraReliability",
            ExpertRole::DataIntegration => "DataIntegration",
            ExpertRole::SecurityCompliance => "SecurityCompliance",
            ExpertRole::FrontendMobile => "FrontendMobile",
            ExpertRole::Domain => "Domain",
            ExpertRole::MlAi => "MLExpert",
        }
    }

    fn prompt_role(&self) -> &'static str {
        match self {
            ExpertRole::SystemsGeneralist => {
                "Systems Generalist (topology, coupling, evolvability)"
            }
            ExpertRole::InfraReliability => {
                "SRE / Infrastructure (latency, SLOs, deployments, operability)"
            }
            ExpertRole::DataIntegration => {
                "Data/Integration (contracts, idempotency, eventing, consistency)"
            }
            ExpertRole::SecurityCompliance => {
                "Security/Compliance (privacy, controls, auditability)"
            }
            ExpertRole::FrontendMobile => "Frontend/Mobile (client flows, perf budgets, offline)",
            ExpertRole::Domain => "Domain (KPIs, SLAs, edge cases)",
            ExpertRole::MlAi => {
                "ML/AI Systems (features, preprocessing, training, model selection, registry, \
                 inference, monitoring)"
            }
        }
    }

    /// Role-specific system prompt; every role shares the output policy.
    fn system_prompt(&self) -> String {
        let header = match self {
            ExpertRole::SystemsGeneralist => {
                "You are a Systems Generalist architect.\n\
                 Expertise: service boundaries, data ownership, sync vs async, coupling/coordination, evolution strategy.\n\
                 Avoid: over-microservicing, premature multi-region, cargo-cult event buses.\n\
                 Defer to: Security/Compliance for legal scope, Infra/SRE for SLO/deploys, ML Expert for ML pipelines.\n\
                 Success: clear and evolvable topology with minimal coupling and explicit tradeoffs."
            }
            ExpertRole::InfraReliability => {
                "You are an Infra/SRE architect.\n\
                 Expertise: SLOs/SLIs, latency budgets, capacity planning, rollout strategies, observability, DR (RTO/RPO).\n\
                 Avoid: gold-plating, unnecessary mesh/multi-region by default.\n\
                 Defer to: Domain for KPIs, Data Integration for semantics, Security for legal/privacy.\n\
                 Success: measurable SLOs, simple deploys, graceful failure, clear rollback paths."
            }
            ExpertRole::DataIntegration => {
                "You are a Data/Integration architect.\n\
                 Expertise: data contracts, idempotency, event-first flows, schema evolution, consistency semantics.\n\
                 Avoid: using events when a simpler sync API suffices; ignoring replays/backfills.\n\
                 Defer to: SRE for SLO/deploys, Security for controls, Frontend for client concerns.\n\
                 Success: predictable semantics with simple recovery and strong interfaces."
            }
            ExpertRole::SecurityCompliance => {
                "You are a Security/Compliance architect.\n\
                 Expertise: authN/Z, encryption/tokenization, least-privilege, auditability, regulatory scope (GDPR/PCI/HIPAA).\n\
                 Avoid: performative controls without risk reduction; blocking delivery with vague asks.\n\
                 Defer to: SRE for deploy/SLO mechanics, Data Integration for data semantics, Domain for KPIs.\n\
                 Success: minimal effective controls that satisfy scope and reduce risk."
            }
            ExpertRole::FrontendMobile => {
                "You are a Frontend/Mobile architect.\n\
                 Expertise: client flows, error states, caching/pagination, offline sync, API ergonomics, perf budgets.\n\
                 Avoid: chatty APIs, over-fetching, neglecting accessibility/low-end devices.\n\
                 Defer to: Data Integration for semantics, SRE for infra/SLOs, Security for privacy controls.\n\
                 Success: responsive, resilient UX with minimal network and graceful degradation."
            }
            ExpertRole::Domain => {
                "You are a Domain architect.\n\
                 Expertise: domain KPIs, user-visible SLAs, critical user journeys, invariants & edge cases.\n\
                 Avoid: designing by API shape alone; skipping rollback/error budgets.\n\
                 Defer to: SRE for deploy/SLO specifics, Security for controls, Data Integration for consistency.\n\
                 Success: precise domain measures & constraints that drive design choices."
            }
            ExpertRole::MlAi => {
                "You are an ML/AI Systems architect.\n\
                 Expertise: feature engineering (offline/online), lineage, training/registry, real-time & batch inference, canary/shadow, drift/quality monitoring, rollback.\n\
                 Avoid: premature GPUs, bespoke platforms without need, mixing PII into inference paths.\n\
                 Defer to: SRE for SLO/deploy, Data Integration for semantics, Security for legal/privacy.\n\
                 Success: ML system that predicts accurately, suggests metrics, says how to measure them, meets latency/throughput/residency with safe rollouts & monitoring."
            }
        };
        format!("{header}\n{OUTPUT_POLICY}")
    }

    /// Output budget for the role's remote call. ML analyses run long.
    fn max_output_tokens(&self) -> u32 {
        match self {
            ExpertRole::MlAi => 7000,
            _ => DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    /// Roles with an offline rule-based stand-in, primary framer first.
    const RULE_ROLES: [ExpertRole; 6] = [
        ExpertRole::SystemsGeneralist,
        ExpertRole::InfraReliability,
        ExpertRole::DataIntegration,
        ExpertRole::SecurityCompliance,
        ExpertRole::FrontendMobile,
        ExpertRole::Domain,
    ];

    /// The full remote panel, primary framer first.
    const ALL: [ExpertRole; 7] = [
        ExpertRole::SystemsGeneralist,
        ExpertRole::InfraReliability,
        ExpertRole::DataIntegration,
        ExpertRole::SecurityCompliance,
        ExpertRole::FrontendMobile,
        ExpertRole::Domain,
        ExpertRole::MlAi,
    ];
}

/// The default rule-based panel, primary framer first.
pub fn rule_panel() -> Vec<Box<dyn Reasoner>> {
    ExpertRole::RULE_ROLES
        .iter()
        .map(|role| Box::new(RuleReasoner { role: *role }) as Box<dyn Reasoner>)
        .collect()
}

/// The default remote panel over one shared client: the rule roles plus the
/// ML/AI expert, same framer-first order.
pub fn remote_panel(client: Arc<ChatClient>) -> Vec<Box<dyn Reasoner>> {
    ExpertRole::ALL
        .iter()
        .map(|role| {
            Box::new(RemoteReasoner {
                role: *role,
                client: Arc::clone(&client),
            }) as Box<dyn Reasoner>
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Rule-based stand-ins
// ---------------------------------------------------------------------------

/// Offline stand-in reasoner for one expert role.
pub struct RuleReasoner {
    pub role: ExpertRole,
}

fn kw_hits(text: &str, keys: &[&str]) -> usize {
    let lower = text.to_lowercase();
    keys.iter().filter(|k| lower.contains(**k)).count()
}

fn question(q: &str, deltas: &[(&str, f64)], delta_risk: f64) -> QuestionCandidate {
    QuestionCandidate {
        q: q.to_string(),
        expected_delta_u: deltas.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        expected_delta_risk: delta_risk,
    }
}

fn delta(change: &str, impact: &str, cost: &str, category: &str, confidence: f64) -> DesignDelta {
    DesignDelta {
        change: change.to_string(),
        impact: impact.to_string(),
        cost: cost.to_string(),
        category: Some(category.to_string()),
        confidence: Some(confidence),
    }
}

impl Reasoner for RuleReasoner {
    fn name(&self) -> &str {
        self.role.name()
    }

    fn analyze(
        &self,
        brief: &ProblemBrief,
        _context: &RunContext,
        _facts: &BTreeMap<String, Value>,
    ) -> Result<Scorecard> {
        let mut sc = Scorecard::empty(self.role.name());
        match self.role {
            ExpertRole::SystemsGeneralist => {
                sc.assumptions = vec![
                    "Assume web/API workloads".to_string(),
                    "Assume single-digit k RPS unless stated".to_string(),
                ];
                let flagged = kw_hits(&brief.description, &["multi-region", "gdpr", "hipaa"]) > 0;
                if flagged {
                    sc.concerns
                        .push("Regulatory or residency implications suspected".to_string());
                }
                sc.key_decisions = vec![KeyDecision {
                    topic: "sync vs async".to_string(),
                    options: vec!["sync".to_string(), "async+saga".to_string()],
                    recommend: "async+saga".to_string(),
                    rationale: "increase resilience".to_string(),
                }];
                sc.question_candidates = vec![
                    question(
                        "What are peak and diurnal RPS on the critical path?",
                        &[("workload", -0.10)],
                        -0.05,
                    ),
                    question(
                        "Any explicit data residency/compliance constraints (HIPAA/GDPR/PCI)?",
                        &[("compliance", -0.10)],
                        -0.07,
                    ),
                ];
                sc.risk_score = if flagged { 0.35 } else { 0.25 };
                sc.uncertainty_updates
                    .insert("scope".to_string(), if flagged { 0.05 } else { -0.05 });
            }
            ExpertRole::InfraReliability => {
                sc.assumptions = vec![
                    "Target SLO: p99 < 1s on critical APIs".to_string(),
                    "Multi-AZ base, backups daily".to_string(),
                ];
                let flagged = kw_hits(&brief.description, &["real-time", "latency"]) > 0;
                if flagged {
                    sc.concerns
                        .push("Aggressive latency budget suspected".to_string());
                }
                sc.question_candidates =
                    vec![question("Required RTO/RPO?", &[("workload", -0.05)], -0.07)];
                sc.design_deltas = vec![delta(
                    "Introduce outbox pattern on write paths",
                    "+reliability +operability",
                    "+2w",
                    "reliability",
                    0.7,
                )];
                sc.risk_score = if flagged { 0.4 } else { 0.3 };
                sc.uncertainty_updates.insert("workload".to_string(), 0.05);
            }
            ExpertRole::DataIntegration => {
                sc.assumptions = vec![
                    "Event-first contracts for cross-service flows".to_string(),
                    "Idempotency on writes".to_string(),
                ];
                let flagged =
                    kw_hits(&brief.description, &["exactly-once", "ledger", "payments"]) > 0;
                if flagged {
                    sc.concerns.push("Consistency semantics critical".to_string());
                }
                sc.question_candidates = vec![question(
                    "What consistency model is required (eventual, bounded-staleness, strong)?",
                    &[("data_quality", -0.07)],
                    -0.05,
                )];
                sc.design_deltas = vec![delta(
                    "Add idempotency keys & retry policies to write APIs",
                    "+correctness",
                    "+1w",
                    "integration",
                    0.65,
                )];
                sc.risk_score = if flagged { 0.45 } else { 0.3 };
                sc.uncertainty_updates
                    .insert("data_quality".to_string(), 0.05);
            }
            ExpertRole::SecurityCompliance => {
                sc.assumptions = vec![
                    "OIDC + SCIM for identity, least privilege access".to_string(),
                    "At-rest & in-transit encryption".to_string(),
                ];
                let flagged = kw_hits(
                    &brief.description,
                    &["pii", "phi", "pci", "health", "payments", "gdpr", "hipaa"],
                ) > 0;
                if flagged {
                    sc.concerns
                        .push("Sensitive data or regulated workload suspected".to_string());
                }
                sc.question_candidates = vec![question(
                    "What data classes are processed (PII/PHI/PCI)? Any regional residency rules?",
                    &[("compliance", -0.12)],
                    -0.08,
                )];
                sc.design_deltas = vec![delta(
                    "Adopt tokenization for sensitive fields",
                    "+security, -blast radius",
                    "+1w",
                    "security",
                    0.75,
                )];
                sc.risk_score = if flagged { 0.5 } else { 0.25 };
                sc.uncertainty_updates
                    .insert("compliance".to_string(), 0.08);
            }
            ExpertRole::FrontendMobile => {
                sc.assumptions = vec![
                    "Explicit error-state design, retries with backoff".to_string(),
                    "Perf budgets on client".to_string(),
                ];
                sc.question_candidates = vec![question(
                    "Do clients require offline-first or background sync?",
                    &[("user_journeys", -0.06)],
                    -0.03,
                )];
                sc.design_deltas = vec![delta(
                    "Add API pagination + caching hints",
                    "+perf",
                    "+0.5w",
                    "frontend",
                    0.6,
                )];
                sc.risk_score = 0.25;
                sc.uncertainty_updates.insert("latency".to_string(), 0.03);
            }
            ExpertRole::Domain => {
                sc.assumptions = vec!["Domain KPIs defined with product".to_string()];
                sc.question_candidates = vec![question(
                    "What are user-visible SLAs (e.g., payment confirmation time, error tolerance)?",
                    &[("scope", -0.05), ("domain_edge_cases", -0.08)],
                    -0.04,
                )];
                sc.risk_score = 0.3;
                sc.uncertainty_updates
                    .insert("domain_edge_cases".to_string(), 0.05);
            }
            // Remote-only role; the rule panel never constructs it
            ExpertRole::MlAi => {}
        }
        Ok(sc)
    }
}

// ---------------------------------------------------------------------------
// Remote reasoner
// ---------------------------------------------------------------------------

/// Output contract shared by every expert's system prompt.
const OUTPUT_POLICY: &str = "Output policy:\n\
- Return ONLY valid JSON for a Scorecard (no prose, no chain-of-thought).\n\
- rationale_summary <= 50 words.\n\
- risk_score in [0,1]\n\
- uncertainty_updates values in [-1,1]\n\
- question_candidates must include expected_delta_U (dict) and expected_delta_risk (float).";

const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 750;
const TEMPERATURE: f64 = 0.2;

/// Example keys/types the remote reasoner must echo back.
fn schema_hint() -> Value {
    json!({
        "agent": "string",
        "assumptions": ["string"],
        "concerns": ["string"],
        "blockers": ["string"],
        "key_decisions": [{"topic": "string", "options": ["string"], "recommend": "string", "rationale": "string"}],
        "question_candidates": [{"q": "string", "expected_delta_U": {"k": "float"}, "expected_delta_risk": "float"}],
        "design_deltas": [{"change": "string", "impact": "string", "cost": "string", "category": "string", "confidence": 0.0}],
        "risk_score": 0.0,
        "uncertainty_updates": {"k": "float"},
        "rationale_summary": "<=50 words"
    })
}

/// Render the user prompt: brief, clarifications, derived hints, org facts.
pub fn render_prompt(
    role: &str,
    agent_name: &str,
    brief: &ProblemBrief,
    context: &RunContext,
    facts: &BTreeMap<String, Value>,
) -> String {
    format!(
        "Role: {role}\n\
         Agent: {agent_name}\n\n\
         Problem:\n\
         title={}\n\
         description={}\n\
         constraints={}\n\
         must_haves={:?}\n\
         metrics={:?}\n\
         timelines={}\n\
         known_risks={:?}\n\
         unknowns={:?}\n\n\
         User clarifications={}\n\
         Derived hints={}\n\
         Org facts={}\n\n\
         Return a Scorecard JSON with fields (example types only):\n{}",
        brief.title,
        brief.description,
        serde_json::to_string(&brief.constraints).unwrap_or_default(),
        brief.must_haves,
        brief.metrics,
        serde_json::to_string(&brief.timelines).unwrap_or_default(),
        brief.known_risks,
        brief.unknowns,
        serde_json::to_string(&context.user_answers).unwrap_or_default(),
        serde_json::to_string(&context.derived).unwrap_or_default(),
        serde_json::to_string(facts).unwrap_or_default(),
        serde_json::to_string_pretty(&schema_hint()).unwrap_or_default(),
    )
}

/// Role-parameterized reasoner backed by a remote model call.
pub struct RemoteReasoner {
    pub role: ExpertRole,
    client: Arc<ChatClient>,
}

impl RemoteReasoner {
    pub fn new(role: ExpertRole, client: Arc<ChatClient>) -> Self {
        Self { role, client }
    }
}

impl Reasoner for RemoteReasoner {
    fn name(&self) -> &str {
        self.role.name()
    }

    fn analyze(
        &self,
        brief: &ProblemBrief,
        context: &RunContext,
        facts: &BTreeMap<String, Value>,
    ) -> Result<Scorecard> {
        let messages = [
            ChatMessage::system(self.role.system_prompt()),
            ChatMessage::user(render_prompt(
                self.role.prompt_role(),
                self.role.name(),
                brief,
                context,
                facts,
            )),
        ];
        let text = self
            .client
            .chat(&messages, TEMPERATURE, self.role.max_output_tokens())?;
        // Malformed output degrades to a defaulted card, never an error
        Ok(scorecard_from_text(self.role.name(), &text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_panel_has_framer_first() {
        let panel = rule_panel();
        assert_eq!(panel.len(), 6);
        assert_eq!(panel[0].name(), "SystemsGeneralist");
    }

    #[test]
    fn remote_panel_adds_ml_expert_with_larger_budget() {
        let config = crate::llm::ChatConfig {
            api_base: "https://api.example.com".to_string(),
            api_key: "k".to_string(),
            ..crate::llm::ChatConfig::from_env()
        };
        let client = Arc::new(ChatClient::new(config).unwrap());

        let panel = remote_panel(client);
        assert_eq!(panel.len(), 7);
        assert_eq!(panel[0].name(), "SystemsGeneralist");
        assert_eq!(panel[6].name(), "MLExpert");

        assert_eq!(ExpertRole::MlAi.max_output_tokens(), 7000);
        assert_eq!(ExpertRole::Domain.max_output_tokens(), 750);
        let prompt = ExpertRole::MlAi.system_prompt();
        assert!(prompt.contains("ML/AI Systems architect"));
        assert!(prompt.contains("Output policy"));
    }

    #[test]
    fn framer_flags_regulated_workloads() {
        let agent = RuleReasoner {
            role: ExpertRole::SystemsGeneralist,
        };
        let ctx = RunContext::default();
        let facts = BTreeMap::new();

        let calm = agent
            .analyze(&ProblemBrief::new("t", "an internal CRUD tool"), &ctx, &facts)
            .unwrap();
        assert!(calm.concerns.is_empty());
        assert_eq!(calm.risk_score, 0.25);
        assert_eq!(calm.uncertainty_updates["scope"], -0.05);

        let flagged = agent
            .analyze(
                &ProblemBrief::new("t", "multi-region payments with GDPR"),
                &ctx,
                &facts,
            )
            .unwrap();
        assert_eq!(flagged.concerns.len(), 1);
        assert_eq!(flagged.risk_score, 0.35);
        assert_eq!(flagged.uncertainty_updates["scope"], 0.05);
    }

    #[test]
    fn security_agent_reacts_to_sensitive_data() {
        let agent = RuleReasoner {
            role: ExpertRole::SecurityCompliance,
        };
        let sc = agent
            .analyze(
                &ProblemBrief::new("t", "we process PII and payments"),
                &RunContext::default(),
                &BTreeMap::new(),
            )
            .unwrap();
        assert_eq!(sc.risk_score, 0.5);
        assert_eq!(
            sc.question_candidates[0].expected_delta_u["compliance"],
            -0.12
        );
    }

    #[test]
    fn prompt_renders_brief_and_context() {
        let mut brief = ProblemBrief::new("Payments Service", "subscriptions across US/EU");
        brief.must_haves.push("idempotency".to_string());
        let mut ctx = RunContext::default();
        ctx.user_answers
            .insert("Peak RPS?".to_string(), "10k rps".to_string());
        ctx.derived
            .insert("peak_rps".to_string(), json!(10000));

        let prompt = render_prompt("Infra/SRE", "InfraReliability", &brief, &ctx, &BTreeMap::new());
        assert!(prompt.contains("Payments Service"));
        assert!(prompt.contains("idempotency"));
        assert!(prompt.contains("10k rps"));
        assert!(prompt.contains("\"peak_rps\":10000"));
        assert!(prompt.contains("expected_delta_U"));
    }
}
