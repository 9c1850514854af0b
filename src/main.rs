//! Architecture decision council CLI
//!
//! Run with no arguments for a demo decision run, or:
//!   council --brief <path>          run a brief loaded from a JSON file
//!   council --outcome <id> [...]    record a real-world outcome
//!   council --question-changed <id> <q>   flag a question that changed the design
//!   council --stats                 show calibration state and question value

use anyhow::{bail, Context, Result};
use design_council::{
    agents::{remote_panel, rule_panel, Reasoner},
    eval::Evaluator,
    facts::FactsStore,
    llm::{ChatClient, ChatConfig},
    orchestrator::{ConsoleChannel, Orchestrator, RunOptions},
    policy::DecisionPolicy,
    trace::TraceLogger,
    types::{DecisionOutput, ProblemBrief, Route},
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--brief" => {
                let path = args.get(2).map(String::as_str);
                let Some(path) = path else {
                    bail!("usage: council --brief <path>");
                };
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read brief {path}"))?;
                let brief: ProblemBrief = serde_json::from_str(&raw)
                    .with_context(|| format!("brief {path} is not valid JSON"))?;
                return run_council(brief);
            }
            "--outcome" => return run_outcome(&args[2..]),
            "--question-changed" => {
                let (Some(id), Some(q)) = (args.get(2), args.get(3)) else {
                    bail!("usage: council --question-changed <decision_id> <question>");
                };
                let eval = open_evaluator()?;
                eval.mark_question_changed_design(id, q)?;
                println!("marked question as design-changing for decision {id}");
                return Ok(());
            }
            "--stats" => return run_stats(),
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other => {
                print_usage();
                bail!("unknown argument: {other}");
            }
        }
    }

    run_council(demo_brief())
}

fn print_usage() {
    println!("Architecture decision council");
    println!();
    println!("  council                              demo decision run");
    println!("  council --brief <path>               run a ProblemBrief JSON file");
    println!("  council --outcome <id> [--rework] [--incidents=N]");
    println!("          [--predictability=X] [--adopted]");
    println!("  council --question-changed <id> <q>  flag a design-changing question");
    println!("  council --stats                      calibration + question value index");
    println!();
    println!("Set COUNCIL_API_BASE / COUNCIL_API_KEY to use LLM-backed experts;");
    println!("otherwise the built-in rule-based panel runs.");
}

/// The brief used when no input file is given.
fn demo_brief() -> ProblemBrief {
    let mut brief = ProblemBrief::new(
        "Subscriptions Payments Service",
        "Design a payments microservice for subscriptions across US/EU with GDPR. \
         We need near real-time confirmation, ledger accuracy, and resiliency. \
         Traffic expected to grow. Consider PCI/PII implications.",
    );
    brief.constraints.insert("deadline_weeks".to_string(), json!(8));
    brief.must_haves = vec!["idempotency".to_string(), "async workflows".to_string()];
    brief.metrics = vec!["auth_success_rate".to_string(), "p95_latency_ms".to_string()];
    brief.timelines.insert("MVP".to_string(), json!("8w"));
    brief.known_risks = vec!["chargeback flow complexity".to_string()];
    brief.unknowns = vec![
        "PCI scope".to_string(),
        "regional data residency".to_string(),
    ];
    brief
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("design-council")
}

fn open_evaluator() -> Result<Evaluator> {
    let dir = data_dir();
    Evaluator::open(dir.join("council.db"), dir.join("weights.json"))
}

/// Pick the expert panel: LLM-backed when credentials are configured, the
/// rule-based panel otherwise.
fn build_panel() -> Result<Vec<Box<dyn Reasoner>>> {
    let config = ChatConfig::from_env();
    if config.api_base.is_empty() || config.api_key.is_empty() {
        tracing::info!("no COUNCIL_API_BASE/COUNCIL_API_KEY set; using rule-based panel");
        return Ok(rule_panel());
    }
    let client = ChatClient::new(config)?;
    Ok(remote_panel(Arc::new(client)))
}

fn run_council(mut brief: ProblemBrief) -> Result<()> {
    let dir = data_dir();
    let eval = open_evaluator()?;
    let weights = eval.load_weights()?;
    let logger = TraceLogger::new(dir.join("traces.jsonl"))?;
    let mut facts = FactsStore::open(dir.join("facts.json"))?;

    let orch = Orchestrator::new(DecisionPolicy::new(weights), build_panel()?, logger);

    let started = std::time::Instant::now();
    let mut channel = ConsoleChannel;
    let decision = orch.run(
        &mut brief,
        &mut facts,
        Some(&mut channel),
        &RunOptions::default(),
    )?;
    let latency_ms = started.elapsed().as_millis() as u64;

    let id = eval.log_decision(&brief.title, &decision, &json!({ "latency_ms": latency_ms }))?;
    if decision.route == Route::Ask {
        let chosen: Vec<(String, bool)> = decision
            .questions
            .iter()
            .map(|q| (q.clone(), true))
            .collect();
        eval.log_questions(&id, &chosen)?;
    }

    print_decision(&id, &decision, &eval)?;
    Ok(())
}

fn print_decision(id: &str, decision: &DecisionOutput, eval: &Evaluator) -> Result<()> {
    println!("\n=== Decision {id} ===");
    println!("{} - {}", decision.route.as_str(), decision.reason);
    println!(
        "edr={:.3} (scaled {:.3})  ig*={:.3}",
        decision.edr,
        eval.scaled_edr(decision.edr)?,
        decision.ig_star
    );

    match decision.route {
        Route::Ask => {
            for (i, q) in decision.questions.iter().enumerate() {
                println!("{}) {q}", i + 1);
            }
        }
        Route::Design => {
            println!("\nC4 containers:");
            for c in &decision.c4_containers {
                println!(
                    " - {} [{}] score={:.2} ({})",
                    c.name, c.meta.agent, c.meta.score, c.responsibility
                );
            }
            println!("\nADRs:");
            for adr in &decision.adrs {
                println!(" - {} {} ({}): {}", adr.id, adr.title, adr.status, adr.reason);
            }
            if !decision.non_functionals.is_empty() {
                println!("\nNon-functionals:");
                for (k, v) in &decision.non_functionals {
                    println!(" - {k} = {v}");
                }
            }
            if !decision.risks.is_empty() {
                println!("\nRisks:");
                for r in &decision.risks {
                    println!(" - {r}");
                }
            }
            if !decision.open_questions.is_empty() {
                println!("\nOpen questions:");
                for q in &decision.open_questions {
                    println!(" - {q}");
                }
            }
        }
    }
    Ok(())
}

/// `--outcome <id> [--rework] [--incidents=N] [--predictability=X] [--adopted]`
fn run_outcome(args: &[String]) -> Result<()> {
    let Some(id) = args.first() else {
        bail!("usage: council --outcome <decision_id> [--rework] [--incidents=N] [--predictability=X] [--adopted]");
    };
    let rework = args.iter().any(|a| a == "--rework");
    let adopted = args.iter().any(|a| a == "--adopted");
    let incidents: i64 = args
        .iter()
        .find_map(|a| a.strip_prefix("--incidents="))
        .map(str::parse)
        .transpose()
        .context("--incidents must be an integer")?
        .unwrap_or(0);
    let predictability: f64 = args
        .iter()
        .find_map(|a| a.strip_prefix("--predictability="))
        .map(str::parse)
        .transpose()
        .context("--predictability must be a number")?
        .unwrap_or(0.5);

    let eval = open_evaluator()?;
    eval.log_outcome(id, rework, incidents, predictability, adopted)?;
    let weights = eval.load_weights()?;
    println!("outcome recorded for {id}; policy scale is now {:.3}", weights.scale);
    Ok(())
}

fn run_stats() -> Result<()> {
    let eval = open_evaluator()?;
    let weights = eval.load_weights()?;
    println!("policy scale: {:.3}", weights.scale);
    println!("question value index: {:.3}", eval.question_value_index()?);
    Ok(())
}
