//! Scorecard decoding with total defaulting
//!
//! External reasoners are black boxes: their output may be valid JSON, JSON
//! wrapped in prose, or garbage. This layer never errors on any of it. The
//! contract is: strict parse first, then the outermost `{...}` substring,
//! then an empty object; every field absent from whatever parsed is
//! backfilled from the canonical empty [`Scorecard`].
//!
//! Decoding walks a generic `serde_json::Value` tree field by field rather
//! than relying on derive-level defaults, so partially-typed output (e.g. a
//! string where a list belongs) degrades per field instead of rejecting the
//! whole card.

use crate::types::{DesignDelta, KeyDecision, QuestionCandidate, Scorecard};
use serde_json::Value;
use std::collections::BTreeMap;

/// Best-effort JSON extraction from raw reasoner text.
///
/// Returns an empty object when nothing parseable is found.
pub fn parse_json_safely(txt: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(txt) {
        if v.is_object() {
            return v;
        }
    }
    // Retry on the outermost brace-delimited substring
    if let (Some(start), Some(end)) = (txt.find('{'), txt.rfind('}')) {
        if end > start {
            if let Ok(v) = serde_json::from_str::<Value>(&txt[start..=end]) {
                if v.is_object() {
                    return v;
                }
            }
        }
    }
    Value::Object(serde_json::Map::new())
}

/// Decode raw reasoner output into a well-formed Scorecard.
pub fn scorecard_from_text(agent: &str, txt: &str) -> Scorecard {
    scorecard_from_value(agent, &parse_json_safely(txt))
}

/// Decode a parsed object into a Scorecard, defaulting every missing or
/// mistyped field. The agent name is authoritative from the caller, never
/// from the payload.
pub fn scorecard_from_value(agent: &str, obj: &Value) -> Scorecard {
    let mut sc = Scorecard::empty(agent);
    sc.assumptions = string_list(obj.get("assumptions"));
    sc.concerns = string_list(obj.get("concerns"));
    sc.blockers = string_list(obj.get("blockers"));
    sc.key_decisions = key_decisions(obj.get("key_decisions"));
    sc.question_candidates = question_candidates(obj.get("question_candidates"));
    sc.design_deltas = design_deltas(obj.get("design_deltas"));
    sc.risk_score = f64_or(obj.get("risk_score"), 0.0);
    sc.uncertainty_updates = f64_map(obj.get("uncertainty_updates"));
    sc.rationale_summary = obj
        .get("rationale_summary")
        .and_then(Value::as_str)
        .map(str::to_string);
    sc
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    v.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|it| it.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn f64_or(v: Option<&Value>, default: f64) -> f64 {
    v.and_then(Value::as_f64).unwrap_or(default)
}

fn str_or_empty(v: Option<&Value>) -> String {
    v.and_then(Value::as_str).unwrap_or_default().to_string()
}

fn f64_map(v: Option<&Value>) -> BTreeMap<String, f64> {
    v.and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, val)| val.as_f64().map(|f| (k.clone(), f)))
                .collect()
        })
        .unwrap_or_default()
}

fn key_decisions(v: Option<&Value>) -> Vec<KeyDecision> {
    v.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|o| KeyDecision {
                    topic: str_or_empty(o.get("topic")),
                    options: string_list(o.get("options")),
                    recommend: str_or_empty(o.get("recommend")),
                    rationale: str_or_empty(o.get("rationale")),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn question_candidates(v: Option<&Value>) -> Vec<QuestionCandidate> {
    v.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|o| QuestionCandidate {
                    q: str_or_empty(o.get("q")),
                    expected_delta_u: f64_map(o.get("expected_delta_U")),
                    expected_delta_risk: f64_or(o.get("expected_delta_risk"), 0.0),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn design_deltas(v: Option<&Value>) -> Vec<DesignDelta> {
    v.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|o| DesignDelta {
                    change: str_or_empty(o.get("change")),
                    impact: str_or_empty(o.get("impact")),
                    cost: str_or_empty(o.get("cost")),
                    category: o.get("category").and_then(Value::as_str).map(str::to_string),
                    confidence: o.get("confidence").and_then(Value::as_f64),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_parses() {
        let v = parse_json_safely(r#"{"risk_score": 0.4}"#);
        assert_eq!(v["risk_score"], 0.4);
    }

    #[test]
    fn json_embedded_in_prose_is_recovered() {
        let txt = "Sure, here is the assessment:\n{\"risk_score\": 0.7, \"concerns\": [\"x\"]}\nHope that helps.";
        let v = parse_json_safely(txt);
        assert_eq!(v["risk_score"], 0.7);
    }

    #[test]
    fn garbage_degrades_to_empty_object() {
        let v = parse_json_safely("I cannot answer that.");
        assert!(v.as_object().unwrap().is_empty());
        let sc = scorecard_from_text("Infra", "I cannot answer that.");
        assert_eq!(sc.agent, "Infra");
        assert_eq!(sc.risk_score, 0.0);
        assert!(sc.question_candidates.is_empty());
    }

    #[test]
    fn partial_card_backfills_missing_fields() {
        let sc = scorecard_from_text(
            "Security",
            r#"{"risk_score": 0.5, "concerns": ["PCI scope unclear"],
                "question_candidates": [
                  {"q": "Residency rules?", "expected_delta_U": {"compliance": -0.12},
                   "expected_delta_risk": -0.08}
                ]}"#,
        );
        assert_eq!(sc.risk_score, 0.5);
        assert_eq!(sc.concerns, vec!["PCI scope unclear"]);
        assert_eq!(sc.question_candidates.len(), 1);
        assert_eq!(
            sc.question_candidates[0].expected_delta_u.get("compliance"),
            Some(&-0.12)
        );
        assert!(sc.assumptions.is_empty());
        assert!(sc.design_deltas.is_empty());
    }

    #[test]
    fn mistyped_fields_degrade_per_field() {
        let sc = scorecard_from_text(
            "Domain",
            r#"{"assumptions": "not a list", "risk_score": "high",
                "design_deltas": [{"change": "Adopt CQRS", "confidence": 0.6}]}"#,
        );
        assert!(sc.assumptions.is_empty());
        assert_eq!(sc.risk_score, 0.0);
        assert_eq!(sc.design_deltas[0].change, "Adopt CQRS");
        assert_eq!(sc.design_deltas[0].confidence, Some(0.6));
        assert_eq!(sc.design_deltas[0].impact, "");
    }

    #[test]
    fn agent_name_comes_from_caller_not_payload() {
        let sc = scorecard_from_text("Framer", r#"{"agent": "Impostor"}"#);
        assert_eq!(sc.agent, "Framer");
    }
}
