//! Append-only decision trace log
//!
//! One typed JSON record per line, one line per orchestration event. This is
//! the audit trail: every run writes `decision_start` through `decision_end`
//! with each scorecard, uncertainty transition, question ranking, policy
//! verdict and design artifact in between. Write-only from the core's
//! perspective; nothing in the engine reads it back.

use crate::state::DebateState;
use crate::types::{Adr, Container, DecisionOutput, ProblemBrief, RankedQuestion, Scorecard};
use anyhow::{Context, Result};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// New 16-hex-char decision id from the brief title and the clock.
pub fn new_decision_id(title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(
        chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_le_bytes(),
    );
    hex::encode(hasher.finalize())[..16].to_string()
}

/// JSONL trace writer for decision runs.
pub struct TraceLogger {
    path: PathBuf,
}

impl TraceLogger {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create trace log dir {parent:?}"))?;
            }
        }
        Ok(Self { path })
    }

    fn write(&self, mut record: Value) -> Result<()> {
        record["ts"] = json!(chrono::Utc::now().timestamp());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open trace log {:?}", self.path))?;
        writeln!(file, "{record}")?;
        Ok(())
    }

    /// Open a decision trace; returns the new decision id.
    pub fn start_decision(&self, brief: &ProblemBrief) -> Result<String> {
        let decision_id = new_decision_id(&brief.title);
        self.write(json!({
            "type": "decision_start",
            "decision_id": decision_id,
            "brief": brief,
        }))?;
        Ok(decision_id)
    }

    pub fn log_scorecard(&self, decision_id: &str, card: &Scorecard) -> Result<()> {
        let mut safe = serde_json::to_value(card)?;
        // Keep rationales short in the trace; no verbatim chain-of-thought.
        // Cut on a char boundary: remote output is arbitrary UTF-8.
        if let Some(summary) = safe.get("rationale_summary").and_then(Value::as_str) {
            if let Some((cut, _)) = summary.char_indices().nth(500) {
                let truncated = format!("{}...", &summary[..cut]);
                safe["rationale_summary"] = json!(truncated);
            }
        }
        self.write(json!({
            "type": "agent_scorecard",
            "decision_id": decision_id,
            "agent": card.agent,
            "scorecard": safe,
        }))
    }

    pub fn log_uncertainty(
        &self,
        decision_id: &str,
        before: &DebateState,
        after: &DebateState,
    ) -> Result<()> {
        self.write(json!({
            "type": "uncertainty_update",
            "decision_id": decision_id,
            "before": before.uncertainty,
            "after": after.uncertainty,
        }))
    }

    pub fn log_question_ranking(&self, decision_id: &str, ranked: &[RankedQuestion]) -> Result<()> {
        self.write(json!({
            "type": "question_ranking",
            "decision_id": decision_id,
            "ranked": ranked,
        }))
    }

    pub fn log_policy_decision(&self, decision_id: &str, decision: &DecisionOutput) -> Result<()> {
        self.write(json!({
            "type": "policy_decision",
            "decision_id": decision_id,
            "route": decision.route.as_str(),
            "reason": decision.reason,
            "edr": decision.edr,
            "ig_star": decision.ig_star,
        }))
    }

    pub fn log_design_artifacts(
        &self,
        decision_id: &str,
        containers: &[Container],
        adrs: &[Adr],
    ) -> Result<()> {
        self.write(json!({
            "type": "design_artifacts",
            "decision_id": decision_id,
            "containers": containers,
            "adrs": adrs,
        }))
    }

    pub fn end_decision(&self, decision_id: &str) -> Result<()> {
        self.write(json!({
            "type": "decision_end",
            "decision_id": decision_id,
        }))
    }
}
