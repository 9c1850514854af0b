//! Decision run orchestration
//!
//! Drives one decision run end to end: the primary framer seeds the debate
//! state, the remaining experts fold in under a fixed order, questions get
//! ranked by information gain, the policy routes, and an ASK either returns
//! to the caller or loops through the clarification channel. Agents 1..N-1
//! are logically independent but MUST be reduced in panel order: the
//! `(mean + new) / 2` risk recurrence is order-dependent even though the
//! running max is not.

use crate::agents::Reasoner;
use crate::answers::AnswerNormalizer;
use crate::compose::compose_design;
use crate::facts::FactsStore;
use crate::policy::DecisionPolicy;
use crate::state::DebateState;
use crate::trace::TraceLogger;
use crate::types::{DecisionOutput, ProblemBrief, RankedQuestion, Route, RunContext, Scorecard};
use anyhow::Result;
use std::collections::BTreeMap;
use std::io::BufRead;

/// Blocking channel for clarification questions. Conceptually "await user
/// input": the call does not return until answers exist.
pub trait ClarificationChannel {
    fn ask(&mut self, questions: &[String]) -> BTreeMap<String, String>;
}

impl<F> ClarificationChannel for F
where
    F: FnMut(&[String]) -> BTreeMap<String, String>,
{
    fn ask(&mut self, questions: &[String]) -> BTreeMap<String, String> {
        self(questions)
    }
}

/// Console-backed channel: prompts per question, records blank answers when
/// stdin is exhausted.
pub struct ConsoleChannel;

impl ClarificationChannel for ConsoleChannel {
    fn ask(&mut self, questions: &[String]) -> BTreeMap<String, String> {
        let mut answers = BTreeMap::new();
        if questions.is_empty() {
            println!("[ASK] (no questions)");
            return answers;
        }
        println!("\n[ASK] I need a few clarifications:");
        let stdin = std::io::stdin();
        let mut lines = stdin.lock().lines();
        for q in questions {
            println!("- {q}");
            print!("  your answer: ");
            use std::io::Write;
            let _ = std::io::stdout().flush();
            let answer = match lines.next() {
                Some(Ok(line)) => line.trim().to_string(),
                _ => {
                    println!("  (stdin not available; leaving blank)");
                    String::new()
                }
            };
            answers.insert(q.clone(), answer);
        }
        answers
    }
}

/// Loop controls for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Re-run the panel automatically after ingesting answers.
    pub auto_continue: bool,
    /// Upper bound on clarification loops per run.
    pub max_ask_loops: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            auto_continue: true,
            max_ask_loops: 2,
        }
    }
}

/// Drives the expert panel through decision runs.
pub struct Orchestrator {
    policy: DecisionPolicy,
    agents: Vec<Box<dyn Reasoner>>,
    logger: TraceLogger,
    normalizer: AnswerNormalizer,
}

impl Orchestrator {
    pub fn new(policy: DecisionPolicy, agents: Vec<Box<dyn Reasoner>>, logger: TraceLogger) -> Self {
        Self {
            policy,
            agents,
            logger,
            normalizer: AnswerNormalizer::new(),
        }
    }

    /// Run one decision: debate, rank, route, and either loop on ASK or
    /// compose the design.
    pub fn run(
        &self,
        brief: &mut ProblemBrief,
        facts: &mut FactsStore,
        mut channel: Option<&mut dyn ClarificationChannel>,
        opts: &RunOptions,
    ) -> Result<DecisionOutput> {
        let decision_id = self.logger.start_decision(brief)?;
        let mut context = RunContext::default();
        let mut state = DebateState::new();
        let mut loops = 0u32;

        loop {
            let cards = self.debate_round(brief, &context, facts, &mut state, &decision_id)?;

            let ranked = rank_questions(&cards);
            self.logger.log_question_ranking(&decision_id, &ranked)?;

            let mut decision = self.policy.decide(&state, &ranked);
            backfill_decision(&mut decision, &self.policy, &state, &ranked);
            self.logger.log_policy_decision(&decision_id, &decision)?;

            match decision.route {
                Route::Ask => {
                    let may_loop = opts.auto_continue && loops < opts.max_ask_loops;
                    if let (true, Some(ch)) = (may_loop, channel.as_mut()) {
                        let answers = ch.ask(&decision.questions);
                        tracing::debug!(
                            loop_count = loops + 1,
                            answers = answers.len(),
                            "ingesting clarification answers"
                        );
                        self.ingest_answers(
                            &answers,
                            &mut context,
                            brief,
                            facts,
                            &mut state,
                            &decision_id,
                        )?;
                        loops += 1;
                        continue;
                    }
                    self.logger.end_decision(&decision_id)?;
                    return Ok(decision);
                }
                Route::Design => {
                    compose_design(&mut decision, &cards, &ranked, &context.derived);
                    self.logger.log_design_artifacts(
                        &decision_id,
                        &decision.c4_containers,
                        &decision.adrs,
                    )?;
                    self.logger.end_decision(&decision_id)?;
                    return Ok(decision);
                }
            }
        }
    }

    /// One full pass over the panel. The framer goes first and re-seeds the
    /// risk scalars; merged uncertainty carries across passes.
    fn debate_round(
        &self,
        brief: &ProblemBrief,
        context: &RunContext,
        facts: &FactsStore,
        state: &mut DebateState,
        decision_id: &str,
    ) -> Result<Vec<Scorecard>> {
        let facts_map = facts.all();
        let mut cards = Vec::with_capacity(self.agents.len());

        let framer = self.agents[0].analyze(brief, context, facts_map)?;
        self.logger.log_scorecard(decision_id, &framer)?;
        state.risk_mean = framer.risk_score;
        state.risk_max = framer.risk_score;
        self.merge_logged(state, &framer.uncertainty_updates, decision_id)?;
        cards.push(framer);

        for agent in &self.agents[1..] {
            let card = agent.analyze(brief, context, facts_map)?;
            self.logger.log_scorecard(decision_id, &card)?;
            // Exponentially-decaying recurrence, not an arithmetic mean;
            // calibration is tuned against exactly this behavior
            state.risk_mean = (state.risk_mean + card.risk_score) / 2.0;
            state.risk_max = state.risk_max.max(card.risk_score);
            self.merge_logged(state, &card.uncertainty_updates, decision_id)?;
            cards.push(card);
        }

        tracing::debug!(
            risk_mean = state.risk_mean,
            risk_max = state.risk_max,
            "debate round complete"
        );
        Ok(cards)
    }

    fn merge_logged(
        &self,
        state: &mut DebateState,
        update: &BTreeMap<String, f64>,
        decision_id: &str,
    ) -> Result<()> {
        let before = state.clone();
        state.merge_uncertainty(std::slice::from_ref(update));
        self.logger.log_uncertainty(decision_id, &before, state)
    }

    /// Ingest clarification answers: normalize, merge uncertainty deltas,
    /// and propagate derived hints into the run context, the brief's
    /// constraints, and the facts store.
    fn ingest_answers(
        &self,
        answers: &BTreeMap<String, String>,
        context: &mut RunContext,
        brief: &mut ProblemBrief,
        facts: &mut FactsStore,
        state: &mut DebateState,
        decision_id: &str,
    ) -> Result<()> {
        context
            .user_answers
            .extend(answers.iter().map(|(k, v)| (k.clone(), v.clone())));

        let normalized = self.normalizer.normalize(answers);
        let before = state.clone();
        state.merge_uncertainty(&normalized.uncertainty_deltas);
        self.logger.log_uncertainty(decision_id, &before, state)?;

        for (key, value) in &normalized.derived {
            context.derived.insert(key.clone(), value.clone());
            // constraints only ever grow
            brief.constraints.insert(key.clone(), value.clone());
            facts.set(key.clone(), value.clone())?;
        }
        Ok(())
    }
}

/// Flatten every card's question candidates and rank by information gain.
/// The sort is stable: ties keep discovery order.
pub fn rank_questions(cards: &[Scorecard]) -> Vec<RankedQuestion> {
    let mut ranked: Vec<RankedQuestion> = cards
        .iter()
        .flat_map(|card| {
            card.question_candidates.iter().map(|qc| RankedQuestion {
                q: qc.q.clone(),
                ig: qc.expected_delta_risk.abs()
                    + qc.expected_delta_u.values().map(|v| v.abs()).sum::<f64>(),
                delta_u: qc.expected_delta_u.clone(),
                delta_risk: qc.expected_delta_risk,
                agent: card.agent.clone(),
            })
        })
        .collect();
    ranked.sort_by(|a, b| b.ig.partial_cmp(&a.ig).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

/// Backfill non-finite policy outputs rather than surfacing them.
fn backfill_decision(
    decision: &mut DecisionOutput,
    policy: &DecisionPolicy,
    state: &DebateState,
    ranked: &[RankedQuestion],
) {
    if !decision.edr.is_finite() {
        decision.edr = policy.compute_edr(state);
    }
    if !decision.ig_star.is_finite() {
        decision.ig_star = ranked.first().map(|r| r.ig).unwrap_or(0.0);
    }
}
