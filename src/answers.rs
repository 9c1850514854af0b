//! Answer normalization
//!
//! Turns free-text clarification answers into structured hints: recovery
//! objectives in seconds, peak throughput in requests/sec, latency budgets
//! in milliseconds, residency, consistency model, and offline support. The
//! parsing is pattern-based, not semantic; anything the patterns miss is
//! simply not derived.
//!
//! Independently of the structured extraction, a coarse keyword pass
//! decrements uncertainty dimensions whenever broad term classes appear.
//! Each successfully derived field applies a second, stronger decrement to
//! its related dimension. Both delta sets merge through the debate state's
//! sequential clamp.

use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Coarse decrement per keyword-class hit.
const CLASS_DELTA: f64 = -0.05;
/// Decrement per successfully derived structured field.
const DERIVED_DELTA: f64 = -0.08;

/// Result of normalizing one batch of answers.
#[derive(Debug, Clone, Default)]
pub struct NormalizedAnswers {
    /// Structured hints keyed by canonical name (`RTO_s`, `peak_rps`, ...).
    pub derived: BTreeMap<String, Value>,
    /// Uncertainty updates in merge order: the coarse keyword pass first,
    /// then the per-derived-field decrements.
    pub uncertainty_deltas: Vec<BTreeMap<String, f64>>,
}

/// Pattern-based normalizer for clarification answers.
pub struct AnswerNormalizer {
    re_duration: Regex,
    re_rate: Regex,
    re_rate_shorthand: Regex,
    re_latency: Regex,
    keyword_classes: Vec<(Regex, Vec<&'static str>)>,
}

impl Default for AnswerNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl AnswerNormalizer {
    pub fn new() -> Self {
        let class = |pat: &str, dims: Vec<&'static str>| (Regex::new(pat).unwrap(), dims);
        Self {
            re_duration: Regex::new(
                r"\b(rto|rpo)\b[^0-9]{0,16}?(\d+(?:\.\d+)?)\s*(minutes|minute|mins|min|m|hours|hour|hrs|hr|h)\b",
            )
            .unwrap(),
            re_rate: Regex::new(r"(\d+(?:\.\d+)?)\s*(k|m)?\s*(?:rps|qps)\b").unwrap(),
            re_rate_shorthand: Regex::new(r"(?:peak|traffic|load)\s*[:=]?\s*(\d+(?:\.\d+)?)\s*(k|m)\b")
                .unwrap(),
            re_latency: Regex::new(
                r"(?:p95|p99|latency\s+budget)[^0-9]{0,16}?(\d+(?:\.\d+)?)\s*(ms|s)\b",
            )
            .unwrap(),
            keyword_classes: vec![
                class(r"\b(rto|rpo|backup|dr)\b", vec!["workload"]),
                class(
                    r"\b(gdpr|hipaa|pci|residency|region)\b",
                    vec!["compliance"],
                ),
                class(
                    r"\b(rps|qps|traffic|latency|p95|p99)\b",
                    vec!["workload", "latency"],
                ),
                class(
                    r"\b(consistency|strong|eventual|staleness)\b",
                    vec!["data_quality"],
                ),
                class(r"\b(user|sla|ux|offline|mobile)\b", vec!["user_journeys"]),
                class(r"\b(scope|mvp|phase)\b", vec!["scope"]),
            ],
        }
    }

    /// Normalize a question→answer map into structured hints plus
    /// uncertainty updates.
    pub fn normalize(&self, answers: &BTreeMap<String, String>) -> NormalizedAnswers {
        let text = answers
            .values()
            .map(|a| a.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");

        let mut derived: BTreeMap<String, Value> = BTreeMap::new();

        // RTO/RPO durations, normalized to seconds
        for caps in self.re_duration.captures_iter(&text) {
            let label = caps[1].to_uppercase();
            let amount: f64 = caps[2].parse().unwrap_or(0.0);
            let seconds = if caps[3].starts_with('h') {
                amount * 3600.0
            } else {
                amount * 60.0
            };
            derived.insert(format!("{label}_s"), json!(seconds as i64));
        }

        // Peak throughput: explicit rps/qps first, then the
        // `peak|traffic|load: Nk` shorthand
        if let Some(caps) = self.re_rate.captures(&text) {
            let amount: f64 = caps[1].parse().unwrap_or(0.0);
            derived.insert("peak_rps".to_string(), json!(apply_multiplier(amount, caps.get(2)) as i64));
        } else if let Some(caps) = self.re_rate_shorthand.captures(&text) {
            let amount: f64 = caps[1].parse().unwrap_or(0.0);
            derived.insert("peak_rps".to_string(), json!(apply_multiplier(amount, caps.get(2)) as i64));
        }

        // Latency budget, normalized to milliseconds
        if let Some(caps) = self.re_latency.captures(&text) {
            let amount: f64 = caps[1].parse().unwrap_or(0.0);
            let ms = if &caps[2] == "s" { amount * 1000.0 } else { amount };
            derived.insert("p95_latency_ms".to_string(), json!(ms as i64));
        }

        // Residency: first matching rule wins, in this priority order
        if let Some(residency) = detect_residency(&text) {
            derived.insert("residency".to_string(), json!(residency));
        }

        // Consistency model, checked in priority order
        if let Some(consistency) = detect_consistency(&text) {
            derived.insert("consistency".to_string(), json!(consistency));
        }

        // Offline support
        if text.contains("offline-first") || text.contains("offline first") || text.contains("background sync") {
            derived.insert("offline_support".to_string(), json!(true));
        }

        NormalizedAnswers {
            uncertainty_deltas: vec![self.coarse_deltas(&text), derived_deltas(&derived)],
            derived,
        }
    }

    /// Keyword-class pass: one decrement per class whose terms appear.
    fn coarse_deltas(&self, text: &str) -> BTreeMap<String, f64> {
        let mut deltas: BTreeMap<String, f64> = BTreeMap::new();
        for (re, dims) in &self.keyword_classes {
            if re.is_match(text) {
                for dim in dims {
                    *deltas.entry(dim.to_string()).or_insert(0.0) += CLASS_DELTA;
                }
            }
        }
        deltas
    }
}

fn apply_multiplier(amount: f64, suffix: Option<regex::Match<'_>>) -> f64 {
    match suffix.map(|m| m.as_str()) {
        Some("k") => amount * 1_000.0,
        Some("m") => amount * 1_000_000.0,
        _ => amount,
    }
}

fn detect_residency(text: &str) -> Option<&'static str> {
    let eu = ["gdpr", "residency", "eu-only", "eu only"];
    let us = ["us-only", "us only"];
    let in_country = ["in-country", "local residency"];
    if eu.iter().any(|kw| text.contains(kw)) {
        Some("EU")
    } else if us.iter().any(|kw| text.contains(kw)) {
        Some("US")
    } else if in_country.iter().any(|kw| text.contains(kw)) {
        Some("IN-COUNTRY")
    } else {
        None
    }
}

fn detect_consistency(text: &str) -> Option<&'static str> {
    if text.contains("strong") {
        Some("strong")
    } else if text.contains("bounded staleness") || text.contains("bounded-staleness") {
        Some("bounded_staleness")
    } else if text.contains("eventual") {
        Some("eventual")
    } else {
        None
    }
}

/// Second, independent decrement to the dimension each derived field speaks to.
fn derived_deltas(derived: &BTreeMap<String, Value>) -> BTreeMap<String, f64> {
    let related = |key: &str| -> Option<&'static str> {
        match key {
            "RTO_s" | "RPO_s" | "peak_rps" => Some("workload"),
            "p95_latency_ms" => Some("latency"),
            "residency" => Some("compliance"),
            "consistency" => Some("data_quality"),
            "offline_support" => Some("user_journeys"),
            _ => None,
        }
    };

    let mut deltas: BTreeMap<String, f64> = BTreeMap::new();
    for key in derived.keys() {
        if let Some(dim) = related(key) {
            *deltas.entry(dim.to_string()).or_insert(0.0) += DERIVED_DELTA;
        }
    }
    deltas
}
