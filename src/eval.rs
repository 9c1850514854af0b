//! Decision telemetry and online calibration
//!
//! SQLite-backed record of decisions, their real-world outcomes, and the
//! questions that were asked. Every recorded outcome runs one gradient step
//! nudging the persisted policy `scale` toward making `scale * mean(EDR)`
//! match the observed pain rate. Weights live in a whole-file JSON map,
//! loaded at start and rewritten wholesale after each outcome.

use crate::policy::PolicyWeights;
use crate::trace::new_decision_id;
use crate::types::DecisionOutput;
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::{Path, PathBuf};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS decisions (
    id TEXT PRIMARY KEY,
    title TEXT,
    route TEXT,
    reason TEXT,
    edr REAL,
    ig_star REAL,
    created_at INTEGER,
    telemetry TEXT
);

CREATE TABLE IF NOT EXISTS outcomes (
    decision_id TEXT,
    rework INTEGER,
    incidents INTEGER,
    predictability REAL,
    adopted INTEGER,
    pain INTEGER,
    created_at INTEGER,
    FOREIGN KEY(decision_id) REFERENCES decisions(id)
);

CREATE TABLE IF NOT EXISTS questions (
    decision_id TEXT,
    q TEXT,
    chosen INTEGER,
    changed_design INTEGER
);
";

const LEARNING_RATE: f64 = 0.05;
const SCALE_MIN: f64 = 0.5;
const SCALE_MAX: f64 = 1.5;

/// SQLite telemetry store plus the policy-weights file it calibrates.
pub struct Evaluator {
    conn: Connection,
    weights_path: PathBuf,
}

impl Evaluator {
    /// Open (or create) the telemetry database and seed the weights file
    /// with defaults if it does not exist yet.
    pub fn open(db_path: impl AsRef<Path>, weights_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create telemetry dir {parent:?}"))?;
            }
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open telemetry db {db_path:?}"))?;
        conn.execute_batch(SCHEMA)
            .context("failed to initialize telemetry schema")?;

        let eval = Self {
            conn,
            weights_path: weights_path.as_ref().to_path_buf(),
        };
        if !eval.weights_path.exists() {
            eval.save_weights(&PolicyWeights::default())?;
        }
        Ok(eval)
    }

    pub fn load_weights(&self) -> Result<PolicyWeights> {
        let raw = std::fs::read_to_string(&self.weights_path)
            .with_context(|| format!("failed to read weights {:?}", self.weights_path))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("weights file {:?} is not valid", self.weights_path))
    }

    /// Rewrite the whole weights file.
    pub fn save_weights(&self, weights: &PolicyWeights) -> Result<()> {
        if let Some(parent) = self.weights_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create weights dir {parent:?}"))?;
            }
        }
        let raw = serde_json::to_string_pretty(weights)?;
        std::fs::write(&self.weights_path, raw)
            .with_context(|| format!("failed to write weights {:?}", self.weights_path))
    }

    /// Persist one decision record; returns its new id.
    pub fn log_decision(
        &self,
        title: &str,
        decision: &DecisionOutput,
        telemetry: &Value,
    ) -> Result<String> {
        let decision_id = new_decision_id(title);
        self.conn.execute(
            "INSERT INTO decisions (id, title, route, reason, edr, ig_star, created_at, telemetry)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                decision_id,
                title,
                decision.route.as_str(),
                decision.reason,
                decision.edr,
                decision.ig_star,
                chrono::Utc::now().timestamp(),
                telemetry.to_string(),
            ],
        )?;
        Ok(decision_id)
    }

    /// Record the ranked questions for a decision, flagging which were
    /// actually put to the user.
    pub fn log_questions(&self, decision_id: &str, questions: &[(String, bool)]) -> Result<()> {
        for (q, chosen) in questions {
            self.conn.execute(
                "INSERT INTO questions (decision_id, q, chosen, changed_design)
                 VALUES (?1, ?2, ?3, 0)",
                params![decision_id, q, *chosen as i64],
            )?;
        }
        Ok(())
    }

    /// Record a real-world outcome and run one calibration step. Pain is 1
    /// when the decision caused rework or incidents, else 0.
    pub fn log_outcome(
        &self,
        decision_id: &str,
        rework: bool,
        incidents: i64,
        predictability: f64,
        adopted: bool,
    ) -> Result<()> {
        let pain: i64 = if rework || incidents > 0 { 1 } else { 0 };
        self.conn.execute(
            "INSERT INTO outcomes (decision_id, rework, incidents, predictability, adopted, pain, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                decision_id,
                rework as i64,
                incidents,
                predictability,
                adopted as i64,
                pain,
                chrono::Utc::now().timestamp(),
            ],
        )?;
        self.calibrate()
    }

    pub fn mark_question_changed_design(&self, decision_id: &str, q: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE questions SET changed_design = 1 WHERE decision_id = ?1 AND q = ?2",
            params![decision_id, q],
        )?;
        Ok(())
    }

    /// Fraction of chosen questions later marked as having changed the
    /// design. 0.0 when nothing has been chosen yet.
    pub fn question_value_index(&self) -> Result<f64> {
        let (chosen, changed): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(changed_design), 0) FROM questions WHERE chosen = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if chosen == 0 {
            return Ok(0.0);
        }
        Ok(changed as f64 / chosen as f64)
    }

    /// EDR adjusted by the calibrated scale, clamped back to [0, 1].
    pub fn scaled_edr(&self, edr: f64) -> Result<f64> {
        let weights = self.load_weights()?;
        Ok((edr * weights.scale).clamp(0.0, 1.0))
    }

    /// One gradient step on `loss = (scale * mean_edr - mean_pain)^2`,
    /// keeping the scale inside [0.5, 1.5].
    fn calibrate(&self) -> Result<()> {
        let stats: (Option<f64>, Option<f64>) = self.conn.query_row(
            "SELECT AVG(d.edr), AVG(o.pain)
             FROM outcomes o JOIN decisions d ON d.id = o.decision_id",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let (Some(mean_edr), Some(mean_pain)) = stats else {
            return Ok(());
        };

        let mut weights = self.load_weights()?;
        let gradient = 2.0 * (weights.scale * mean_edr - mean_pain) * mean_edr;
        weights.scale = (weights.scale - LEARNING_RATE * gradient).clamp(SCALE_MIN, SCALE_MAX);
        tracing::debug!(
            mean_edr,
            mean_pain,
            scale = weights.scale,
            "calibrated policy scale"
        );
        self.save_weights(&weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Route;
    use serde_json::json;

    fn fixture() -> (tempfile::TempDir, Evaluator) {
        let dir = tempfile::tempdir().unwrap();
        let eval = Evaluator::open(dir.path().join("council.db"), dir.path().join("weights.json"))
            .unwrap();
        (dir, eval)
    }

    fn decision_with_edr(edr: f64) -> DecisionOutput {
        DecisionOutput {
            route: Route::Design,
            reason: format!("EDR={edr:.2}, IG*=0.05 -> Confident enough to propose a design"),
            questions: Vec::new(),
            edr,
            ig_star: 0.05,
            c4_containers: Vec::new(),
            adrs: Vec::new(),
            non_functionals: Default::default(),
            risks: Vec::new(),
            open_questions: Vec::new(),
        }
    }

    #[test]
    fn open_seeds_default_weights() {
        let (_dir, eval) = fixture();
        let weights = eval.load_weights().unwrap();
        assert_eq!(weights, PolicyWeights::default());
        assert_eq!(weights.scale, 1.0);
    }

    #[test]
    fn weights_without_scale_field_load_with_default_scale() {
        let dir = tempfile::tempdir().unwrap();
        let weights_path = dir.path().join("weights.json");
        std::fs::write(
            &weights_path,
            r#"{"risk_mean":0.35,"scope":0.25,"workload":0.15,"compliance":0.10,"data_quality":0.10,"third_party":0.05}"#,
        )
        .unwrap();
        let eval = Evaluator::open(dir.path().join("council.db"), &weights_path).unwrap();
        assert_eq!(eval.load_weights().unwrap().scale, 1.0);
    }

    #[test]
    fn decision_round_trips_through_the_store() {
        let (_dir, eval) = fixture();
        let id = eval
            .log_decision("Payments", &decision_with_edr(0.42), &json!({"agents": 6}))
            .unwrap();
        assert_eq!(id.len(), 16);

        let (title, route, edr): (String, String, f64) = eval
            .conn
            .query_row(
                "SELECT title, route, edr FROM decisions WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(title, "Payments");
        assert_eq!(route, "DESIGN");
        assert!((edr - 0.42).abs() < 1e-9);
    }

    #[test]
    fn pain_derives_from_rework_or_incidents() {
        let (_dir, eval) = fixture();
        let id = eval
            .log_decision("Painful", &decision_with_edr(0.5), &json!({}))
            .unwrap();
        eval.log_outcome(&id, false, 0, 0.9, true).unwrap();
        eval.log_outcome(&id, true, 0, 0.5, true).unwrap();
        eval.log_outcome(&id, false, 3, 0.5, false).unwrap();

        let pains: Vec<i64> = eval
            .conn
            .prepare("SELECT pain FROM outcomes ORDER BY rowid")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(pains, vec![0, 1, 1]);
    }

    #[test]
    fn question_value_index_counts_chosen_only() {
        let (_dir, eval) = fixture();
        let id = eval
            .log_decision("Quiz", &decision_with_edr(0.6), &json!({}))
            .unwrap();
        eval.log_questions(
            &id,
            &[
                ("What is the RTO?".to_string(), true),
                ("What is peak traffic?".to_string(), true),
                ("Any offline needs?".to_string(), false),
            ],
        )
        .unwrap();
        assert_eq!(eval.question_value_index().unwrap(), 0.0);

        eval.mark_question_changed_design(&id, "What is the RTO?")
            .unwrap();
        assert!((eval.question_value_index().unwrap() - 0.5).abs() < 1e-9);

        // Unchosen questions never enter the denominator
        eval.mark_question_changed_design(&id, "Any offline needs?")
            .unwrap();
        assert!((eval.question_value_index().unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn painless_outcomes_drive_scale_down_to_the_floor() {
        let (_dir, eval) = fixture();
        let id = eval
            .log_decision("Smooth", &decision_with_edr(0.6), &json!({}))
            .unwrap();

        let mut prev = eval.load_weights().unwrap().scale;
        for _ in 0..100 {
            eval.log_outcome(&id, false, 0, 0.9, true).unwrap();
            let scale = eval.load_weights().unwrap().scale;
            assert!(scale <= prev);
            assert!(scale >= SCALE_MIN);
            prev = scale;
        }
        // target p/e = 0 sits below the floor, so the clamp wins
        assert!((prev - SCALE_MIN).abs() < 1e-9);
    }

    #[test]
    fn painful_outcomes_drive_scale_up_to_the_ceiling() {
        let (_dir, eval) = fixture();
        let id = eval
            .log_decision("Rough", &decision_with_edr(0.6), &json!({}))
            .unwrap();

        let mut prev = eval.load_weights().unwrap().scale;
        for _ in 0..100 {
            eval.log_outcome(&id, true, 2, 0.2, false).unwrap();
            let scale = eval.load_weights().unwrap().scale;
            assert!(scale >= prev);
            assert!(scale <= SCALE_MAX);
            prev = scale;
        }
        // target p/e = 1/0.6 sits above the ceiling
        assert!((prev - SCALE_MAX).abs() < 1e-9);
    }

    #[test]
    fn mixed_outcomes_converge_to_interior_target() {
        let (_dir, eval) = fixture();
        let id = eval
            .log_decision("Mixed", &decision_with_edr(0.8), &json!({}))
            .unwrap();

        // Alternating pain at constant edr 0.8: pain rate 0.5, so the scale
        // should settle at 0.5 / 0.8 = 0.625, inside the clamp bounds
        for i in 0..200 {
            let painful = i % 2 == 1;
            eval.log_outcome(&id, painful, 0, 0.7, !painful).unwrap();
            let scale = eval.load_weights().unwrap().scale;
            assert!((SCALE_MIN..=SCALE_MAX).contains(&scale));
        }
        let scale = eval.load_weights().unwrap().scale;
        assert!((scale - 0.625).abs() < 1e-3);
    }

    #[test]
    fn scaled_edr_stays_in_unit_interval() {
        let (_dir, eval) = fixture();
        let mut weights = PolicyWeights::default();
        weights.scale = 1.5;
        eval.save_weights(&weights).unwrap();
        assert_eq!(eval.scaled_edr(0.8).unwrap(), 1.0);
        assert!((eval.scaled_edr(0.4).unwrap() - 0.6).abs() < 1e-9);
    }
}
