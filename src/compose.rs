//! Design composition from expert proposals
//!
//! Flattens every scorecard's design deltas into proposals, clusters them by
//! textual similarity, scores each cluster's representative, and emits one
//! container and one ADR per winning cluster. When the panel proposed
//! nothing, the composer emits an explicitly empty design rather than
//! fabricating a baseline architecture.

use crate::types::{
    Adr, Container, ContainerMeta, DecisionOutput, RankedQuestion, Scorecard, NON_FUNCTIONAL_KEYS,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Proposals whose pairwise similarity reaches this threshold share a
/// cluster. Hard contract; the metric underneath is Sørensen–Dice.
const SIMILARITY_THRESHOLD: f64 = 0.5;

/// Confidence assumed for proposals that state none.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Alignment reward per derived non-functional hint the proposal speaks to.
const ALIGNMENT_BONUS: f64 = 0.1;

const MAX_RISKS: usize = 10;

#[derive(Debug, Clone)]
struct Proposal {
    agent: String,
    category: Option<String>,
    name: String,
    change: String,
    text: String,
    confidence: Option<f64>,
}

/// Populate a DESIGN decision's artifact fields from the debate.
pub fn compose_design(
    decision: &mut DecisionOutput,
    cards: &[Scorecard],
    ranked: &[RankedQuestion],
    derived: &BTreeMap<String, Value>,
) {
    decision.non_functionals = derived
        .iter()
        .filter(|(k, _)| NON_FUNCTIONAL_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    decision.risks = cards
        .iter()
        .flat_map(|sc| sc.concerns.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .take(MAX_RISKS)
        .collect();

    decision.open_questions = ranked.iter().take(3).map(|r| r.q.clone()).collect();

    let proposals = normalize_proposals(cards);
    if proposals.is_empty() {
        // Never fabricate a baseline design
        decision.c4_containers = Vec::new();
        decision.adrs = Vec::new();
        decision
            .reason
            .push_str(" | No proposals from experts; emitting empty design.");
        return;
    }

    let clusters = cluster(proposals);
    let mut scored: Vec<(Vec<Proposal>, usize, f64)> = clusters
        .into_iter()
        .map(|cl| {
            let (rep, score) = score_cluster(&cl, derived);
            (cl, rep, score)
        })
        .collect();
    // Stable sort: identical inputs yield identical cluster order and ADR ids
    scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    decision.c4_containers = scored
        .iter()
        .map(|(cl, rep, score)| {
            let p = &cl[*rep];
            Container {
                name: format!(
                    "{}::{}",
                    p.category.as_deref().unwrap_or("component"),
                    p.name
                ),
                responsibility: p.text.clone(),
                meta: ContainerMeta {
                    agent: p.agent.clone(),
                    confidence: p.confidence,
                    score: *score,
                },
            }
        })
        .collect();

    decision.adrs = scored
        .iter()
        .enumerate()
        .map(|(i, (cl, rep, score))| {
            let p = &cl[*rep];
            let title_source = if p.change.is_empty() { &p.text } else { &p.change };
            Adr {
                id: format!("ADR-{:03}", 100 + i + 1),
                title: format!("Adopt {title_source}"),
                status: "proposed".to_string(),
                reason: format!("score={score:.2}, agent={}, votes={}", p.agent, cl.len()),
            }
        })
        .collect();
}

/// One proposal per design delta that actually says something.
fn normalize_proposals(cards: &[Scorecard]) -> Vec<Proposal> {
    let mut proposals = Vec::new();
    for card in cards {
        for delta in &card.design_deltas {
            let text = if delta.impact.is_empty() {
                delta.change.clone()
            } else {
                delta.impact.clone()
            };
            if text.is_empty() {
                continue;
            }
            let name_source = if delta.change.is_empty() { &text } else { &delta.change };
            proposals.push(Proposal {
                agent: card.agent.clone(),
                category: delta.category.clone(),
                name: slug(name_source),
                change: delta.change.clone(),
                text,
                confidence: delta.confidence,
            });
        }
    }
    proposals
}

/// Short lowercase token slug for container names.
fn slug(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .take(4)
        .collect::<Vec<_>>()
        .join("-")
}

/// Greedy first-fit clustering against each cluster's first member.
fn cluster(proposals: Vec<Proposal>) -> Vec<Vec<Proposal>> {
    let mut clusters: Vec<Vec<Proposal>> = Vec::new();
    for proposal in proposals {
        let target = clusters.iter_mut().find(|cl| {
            strsim::sorensen_dice(
                &cl[0].text.to_lowercase(),
                &proposal.text.to_lowercase(),
            ) >= SIMILARITY_THRESHOLD
        });
        match target {
            Some(cl) => cl.push(proposal),
            None => clusters.push(vec![proposal]),
        }
    }
    clusters
}

/// Pick the representative (highest stated confidence, first on ties) and
/// score the cluster: monotonic in the representative's confidence, plus a
/// bonus per derived hint the proposal text aligns with.
fn score_cluster(cluster: &[Proposal], derived: &BTreeMap<String, Value>) -> (usize, f64) {
    let mut rep = 0usize;
    for (i, p) in cluster.iter().enumerate() {
        if p.confidence.unwrap_or(DEFAULT_CONFIDENCE)
            > cluster[rep].confidence.unwrap_or(DEFAULT_CONFIDENCE)
        {
            rep = i;
        }
    }
    let p = &cluster[rep];
    let haystack = format!("{} {}", p.change, p.text).to_lowercase();
    let alignment = derived
        .keys()
        .filter(|k| hint_keywords(k).iter().any(|kw| haystack.contains(kw)))
        .count();
    let score = p.confidence.unwrap_or(DEFAULT_CONFIDENCE) + ALIGNMENT_BONUS * alignment as f64;
    (rep, score)
}

fn hint_keywords(key: &str) -> &'static [&'static str] {
    match key {
        "p95_latency_ms" => &["latency", "perf", "caching"],
        "peak_rps" => &["throughput", "scal", "load", "pagination"],
        "RTO_s" | "RPO_s" => &["reliability", "backup", "recovery", "outbox"],
        "residency" => &["residency", "region", "tokenization", "encryption", "security"],
        "consistency" => &["consistency", "idempotency", "correctness", "exactly-once"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DesignDelta, Route};
    use serde_json::json;

    fn design_decision() -> DecisionOutput {
        DecisionOutput {
            route: Route::Design,
            reason: "EDR=0.40, IG*=0.10 -> Confident enough to propose a design".to_string(),
            questions: Vec::new(),
            edr: 0.40,
            ig_star: 0.10,
            c4_containers: Vec::new(),
            adrs: Vec::new(),
            non_functionals: BTreeMap::new(),
            risks: Vec::new(),
            open_questions: Vec::new(),
        }
    }

    fn card_with_delta(agent: &str, change: &str, impact: &str, confidence: f64) -> Scorecard {
        let mut sc = Scorecard::empty(agent);
        sc.design_deltas.push(DesignDelta {
            change: change.to_string(),
            impact: impact.to_string(),
            cost: "+1w".to_string(),
            category: Some("reliability".to_string()),
            confidence: Some(confidence),
        });
        sc
    }

    fn ranked(q: &str, ig: f64) -> RankedQuestion {
        RankedQuestion {
            q: q.to_string(),
            ig,
            delta_u: BTreeMap::new(),
            delta_risk: 0.0,
            agent: "t".to_string(),
        }
    }

    #[test]
    fn no_proposals_yields_empty_design_with_note() {
        let mut decision = design_decision();
        let mut card = Scorecard::empty("Systems");
        card.concerns.push("Capacity assumptions may be low".to_string());

        let mut derived = BTreeMap::new();
        derived.insert("peak_rps".to_string(), json!(10000));
        derived.insert("not_a_hint".to_string(), json!(1));

        compose_design(
            &mut decision,
            &[card],
            &[ranked("Peak RPS?", 0.2)],
            &derived,
        );

        assert!(decision.c4_containers.is_empty());
        assert!(decision.adrs.is_empty());
        assert!(decision.reason.contains("No proposals"));
        assert_eq!(decision.non_functionals.len(), 1);
        assert_eq!(decision.non_functionals["peak_rps"], json!(10000));
        assert_eq!(decision.risks, vec!["Capacity assumptions may be low"]);
        assert_eq!(decision.open_questions, vec!["Peak RPS?"]);
    }

    #[test]
    fn similar_proposals_share_a_cluster() {
        let mut decision = design_decision();
        let cards = vec![
            card_with_delta("Infra", "Introduce outbox pattern on write paths", "", 0.7),
            card_with_delta("Data", "Introduce outbox pattern for writes", "", 0.6),
            card_with_delta("Security", "Adopt tokenization for sensitive fields", "", 0.75),
        ];

        compose_design(&mut decision, &cards, &[], &BTreeMap::new());

        assert_eq!(decision.c4_containers.len(), 2);
        assert_eq!(decision.adrs.len(), 2);
        // The two-vote outbox cluster records its vote count
        let outbox = decision
            .adrs
            .iter()
            .find(|a| a.title.contains("outbox"))
            .unwrap();
        assert!(outbox.reason.contains("votes=2"));
    }

    #[test]
    fn clusters_sort_by_score_and_number_adrs_sequentially() {
        let mut decision = design_decision();
        let cards = vec![
            card_with_delta("Frontend", "Add API pagination", "+perf", 0.4),
            card_with_delta("Security", "Adopt tokenization for sensitive fields", "+security", 0.9),
        ];

        compose_design(&mut decision, &cards, &[], &BTreeMap::new());

        assert_eq!(decision.adrs[0].id, "ADR-101");
        assert_eq!(decision.adrs[1].id, "ADR-102");
        assert!(decision.adrs[0].title.contains("tokenization"));
        assert_eq!(decision.adrs[0].status, "proposed");
        assert!(decision.c4_containers[0].meta.score > decision.c4_containers[1].meta.score);
        assert_eq!(
            decision.c4_containers[0].name,
            "reliability::adopt-tokenization-for-sensitive"
        );
    }

    #[test]
    fn alignment_with_derived_hints_raises_score() {
        let mut derived = BTreeMap::new();
        derived.insert("p95_latency_ms".to_string(), json!(250));

        let mut with_hint = design_decision();
        compose_design(
            &mut with_hint,
            &[card_with_delta("Frontend", "Add caching hints", "+perf", 0.6)],
            &[],
            &derived,
        );

        let mut without_hint = design_decision();
        compose_design(
            &mut without_hint,
            &[card_with_delta("Frontend", "Add caching hints", "+perf", 0.6)],
            &[],
            &BTreeMap::new(),
        );

        assert!(with_hint.c4_containers[0].meta.score > without_hint.c4_containers[0].meta.score);
    }

    #[test]
    fn composition_is_idempotent() {
        let cards = vec![
            card_with_delta("Infra", "Introduce outbox pattern on write paths", "", 0.7),
            card_with_delta("Security", "Adopt tokenization for sensitive fields", "", 0.75),
            card_with_delta("Frontend", "Add API pagination + caching hints", "+perf", 0.6),
        ];
        let mut derived = BTreeMap::new();
        derived.insert("residency".to_string(), json!("EU"));
        let questions = vec![ranked("Residency?", 0.2), ranked("RTO?", 0.1)];

        let mut a = design_decision();
        compose_design(&mut a, &cards, &questions, &derived);
        let mut b = design_decision();
        compose_design(&mut b, &cards, &questions, &derived);

        assert_eq!(serde_json::to_value(&a).unwrap(), serde_json::to_value(&b).unwrap());
    }

    #[test]
    fn risks_are_deduplicated_and_capped() {
        let mut decision = design_decision();
        let mut cards = Vec::new();
        for i in 0..15 {
            let mut sc = Scorecard::empty(format!("agent-{i}"));
            sc.concerns.push(format!("concern {i:02}"));
            sc.concerns.push("shared concern".to_string());
            cards.push(sc);
        }

        compose_design(&mut decision, &cards, &[], &BTreeMap::new());
        assert_eq!(decision.risks.len(), 10);
        let unique: BTreeSet<_> = decision.risks.iter().collect();
        assert_eq!(unique.len(), 10);
    }
}
