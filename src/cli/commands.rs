use crate::config::KbConfig;
use crate::core::{evaluate_formula, invert_formula, Agent, Formula, Outcome, Scorer};
use crate::error::{KbError, KbResult};
use crate::ingest::{self, IngestOutcome, IngestReport};
use crate::oracle::OracleSet;
use crate::store::{GraphStore, InverseOutcome, StoreGateway};
use crate::training::{self, ItemStatus};
use crate::types::{ContractViolation, Observed, TestCase, UnitPair};
use colored::Colorize;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Format a number for display, dropping float noise past nine decimals
fn format_number(n: f64) -> String {
    let rounded = (n * 1e9).round() / 1e9;
    if rounded.abs() >= 1e15 || (rounded != 0.0 && rounded.abs() < 1e-6) {
        return format!("{}", n);
    }
    format!("{:.9}", rounded)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Open the configured graph store behind a gateway
pub fn open_gateway(config: &KbConfig) -> KbResult<StoreGateway> {
    let store = GraphStore::open(&config.store.path)?;
    Ok(StoreGateway::new(Arc::new(store)))
}

/// Wire the configured oracle and store into an agent
pub fn build_agent(config: &KbConfig) -> KbResult<(Agent, OracleSet)> {
    let oracles = OracleSet::from_config(&config.oracle)?;
    let gateway = open_gateway(config)?;
    let agent = Agent::new(
        oracles.oracle.clone(),
        gateway,
        config.acquisition.clone(),
    );
    Ok((agent, oracles))
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Found { pair, formula } => {
            println!("{}", "✅ Found in knowledge graph".bold().green());
            println!("   Pair:    {}", pair.to_string().bright_blue());
            println!("   Formula: {}", formula.bright_yellow());
        }
        Outcome::Learned {
            pair,
            formula,
            score,
            attempts,
            inverse,
        } => {
            println!("{}", "🧠 Learned a new rule".bold().green());
            println!("   Pair:     {}", pair.to_string().bright_blue());
            println!("   Formula:  {}", formula.bright_yellow());
            println!("   Score:    {:.0}%", score * 100.0);
            println!("   Attempts: {}", attempts);
            match inverse {
                InverseOutcome::Stored { formula } => {
                    println!("   Inverse:  {}", formula.bright_yellow())
                }
                InverseOutcome::AlreadyPresent { formula } => {
                    println!("   Inverse:  {} (already known)", formula)
                }
                InverseOutcome::Skipped { reason } => {
                    println!("   Inverse:  {} {}", "skipped:".yellow(), reason)
                }
            }
        }
        Outcome::NotMeaningful { .. } => {
            println!("{}", format!("⚠️  {}", outcome).yellow());
        }
        Outcome::Unresolved { best_score, .. } => {
            println!("{}", format!("❌ {}", outcome).red());
            println!("   Best score: {:.0}%", best_score * 100.0);
        }
    }
}

/// Execute the ask command
pub async fn ask(config: &KbConfig, question: String) -> KbResult<()> {
    println!("{}", "🔥 Unitforge - Ask".bold().green());
    println!("   Question: {}\n", question.trim());

    let (agent, _) = build_agent(config)?;
    let outcome = agent.ask(&question).await?;
    print_outcome(&outcome);
    Ok(())
}

/// Execute the train command
pub async fn train(
    config: &KbConfig,
    cycles: Option<usize>,
    questions_per_cycle: Option<usize>,
    prompt: Option<String>,
) -> KbResult<()> {
    let mut settings = config.training.clone();
    if let Some(cycles) = cycles {
        settings.cycles = cycles;
    }
    if let Some(count) = questions_per_cycle {
        settings.questions_per_cycle = count;
    }
    if let Some(prompt) = prompt {
        settings.prompt = prompt;
    }

    println!("{}", "🔥 Unitforge - Training".bold().green());
    println!(
        "   Cycles: {}, questions per cycle: {}, concurrency: {}\n",
        settings.cycles, settings.questions_per_cycle, settings.concurrency
    );

    let (agent, oracles) = build_agent(config)?;
    let report = training::run_training(&agent, oracles.questions, &settings).await;

    for cycle in &report.cycles {
        println!(
            "{}",
            format!("📚 Cycle {} ({} ms)", cycle.cycle, cycle.elapsed_ms).bold().cyan()
        );
        if let Some(error) = &cycle.question_error {
            println!("   {} {}", "❌ Question generation failed:".red(), error);
            continue;
        }
        for item in &cycle.items {
            match &item.status {
                ItemStatus::Resolved { outcome } => println!(
                    "   {:<15} {} {}",
                    outcome.kind().bright_blue(),
                    item.question,
                    outcome.formula().unwrap_or_default().bright_yellow()
                ),
                ItemStatus::Errored { reason } => {
                    println!("   {:<15} {} {}", "errored".red(), item.question, reason)
                }
            }
        }
    }

    println!();
    println!("{}", "✅ Training complete".bold().green());
    println!(
        "   learned: {}, found: {}, not meaningful: {}, unresolved: {}, errored: {} ({} ms)",
        report.count("learned"),
        report.count("found"),
        report.count("not_meaningful"),
        report.count("unresolved"),
        report.errored(),
        report.elapsed_ms
    );
    Ok(())
}

fn print_ingest_report(report: &IngestReport) {
    for entry in &report.entries {
        match &entry.outcome {
            IngestOutcome::Stored { inverse } => {
                let inverse = match inverse {
                    InverseOutcome::Stored { formula } => format!("inverse {}", formula),
                    InverseOutcome::AlreadyPresent { .. } => "inverse already known".to_string(),
                    InverseOutcome::Skipped { reason } => format!("no inverse: {}", reason),
                };
                println!("   {} {} ({})", "✅".green(), entry.key.bright_blue(), inverse)
            }
            IngestOutcome::SkippedInvalid { reason } => {
                println!("   {} {} {}", "⚠️ ".yellow(), entry.key.bright_blue(), reason)
            }
            IngestOutcome::Errored { reason } => {
                println!("   {} {} {}", "❌".red(), entry.key.bright_blue(), reason)
            }
        }
    }
    println!();
    println!(
        "{}",
        format!(
            "Stored {}, skipped {}, errored {} in {} ms",
            report.stored(),
            report.skipped(),
            report.errored(),
            report.elapsed.as_millis()
        )
        .bold()
    );
}

/// Execute the ingest command
pub async fn ingest(config: &KbConfig, file: PathBuf, concurrent: bool) -> KbResult<()> {
    println!("{}", "🔥 Unitforge - Ingesting conversions".bold().green());
    println!("   File: {}\n", file.display());

    let records = ingest::load_records(&file)?;
    let gateway = open_gateway(config)?;
    let report = if concurrent {
        ingest::ingest_records_concurrent(&gateway, records).await
    } else {
        ingest::ingest_records(&gateway, records)
    };
    print_ingest_report(&report);
    Ok(())
}

/// Execute the lookup command
pub fn lookup(config: &KbConfig, from: String, to: String) -> KbResult<()> {
    let pair = UnitPair::new(&from, &to)?;
    let gateway = open_gateway(config)?;

    match gateway.lookup_relation(&pair)? {
        Some(relation) => {
            println!("{}", relation.formula.bright_yellow());
            for (key, value) in &relation.provenance {
                println!("   {}: {}", key.cyan(), value);
            }
            Ok(())
        }
        None => Err(KbError::Validation(format!(
            "No conversion stored for {}",
            pair
        ))),
    }
}

/// Execute the list command
pub fn list(config: &KbConfig) -> KbResult<()> {
    let gateway = open_gateway(config)?;
    let conversions = gateway.conversions()?;

    println!(
        "{}",
        format!("📐 {} conversions in {}", conversions.len(), config.store.path.display())
            .bold()
            .green()
    );
    for relation in &conversions {
        println!(
            "   {} → {}  {}",
            relation.from_unit.bright_blue(),
            relation.to_unit.bright_blue(),
            relation.formula.bright_yellow()
        );
    }
    Ok(())
}

/// Execute the evaluate command
pub fn evaluate(formula: String, value: f64, var: Option<String>) -> KbResult<()> {
    let input = match var {
        Some(var) => var,
        None => Formula::parse(&formula)?.input().to_string(),
    };
    let result = evaluate_formula(&formula, &input, value)?;
    println!("{}", format_number(result));
    Ok(())
}

/// Execute the invert command
pub fn invert(formula: String) -> KbResult<()> {
    println!("{}", invert_formula(&formula)?);
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CasesFile {
    List(Vec<TestCase>),
    Wrapped { test_cases: Vec<TestCase> },
}

/// Read test cases from a YAML or JSON file: a list, or `{test_cases: [...]}`
pub fn load_test_cases(path: &Path) -> KbResult<Vec<TestCase>> {
    let content = std::fs::read_to_string(path)?;
    let cases = match serde_yaml::from_str::<CasesFile>(&content)? {
        CasesFile::List(cases) | CasesFile::Wrapped { test_cases: cases } => cases,
    };
    if let Some(bad) = cases
        .iter()
        .find(|c| !c.input_value.is_finite() || !c.expected_output.is_finite())
    {
        return Err(ContractViolation::new(
            "score",
            format!("test case values must be finite, got {:?}", bad),
        )
        .into());
    }
    Ok(cases)
}

/// Execute the score command
pub fn score(config: &KbConfig, formula: String, cases_file: PathBuf) -> KbResult<()> {
    let cases = load_test_cases(&cases_file)?;
    let scorer = Scorer::new(config.acquisition.tolerance);
    let output = scorer.score(&formula, &cases)?;

    let accepted = output.score >= config.acquisition.acceptance_threshold;
    let summary = format!(
        "Score {:.2} ({} / {} passed)",
        output.score, output.passed, output.total
    );
    if accepted {
        println!("{} {}", "✅".green(), summary.bold().green());
    } else {
        println!("{} {}", "❌".red(), summary.bold().red());
    }

    for failure in &output.failures {
        let observed = match &failure.observed {
            Observed::Mismatch { actual } => format_number(*actual),
            Observed::Error { message } => format!("error: {}", message),
        };
        println!(
            "   input {} expected {} got {}",
            format_number(failure.case.input_value),
            format_number(failure.case.expected_output),
            observed.red()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(212.0), "212");
        assert_eq!(format_number(0.30000000000000004), "0.3");
        assert_eq!(format_number(-40.0), "-40");
        assert_eq!(format_number(1e-9), "0.000000001");
    }

    #[test]
    fn test_load_test_cases_list_and_wrapped() {
        let dir = TempDir::new().unwrap();

        let list = dir.path().join("cases.yaml");
        std::fs::write(
            &list,
            "- input_value: 1\n  expected_output: 100\n- input_value: 2\n  expected_output: 200\n",
        )
        .unwrap();
        assert_eq!(load_test_cases(&list).unwrap().len(), 2);

        let wrapped = dir.path().join("cases.json");
        std::fs::write(
            &wrapped,
            r#"{"test_cases": [{"input_value": 0, "expected_output": 32}]}"#,
        )
        .unwrap();
        assert_eq!(
            load_test_cases(&wrapped).unwrap(),
            vec![TestCase::new(0.0, 32.0)]
        );
    }

    #[test]
    fn test_lookup_missing_is_error() {
        let dir = TempDir::new().unwrap();
        let mut config = KbConfig::default();
        config.store.path = dir.path().join("kb.yaml");

        let err = lookup(&config, "meters".to_string(), "feet".to_string()).unwrap_err();
        assert!(err.to_string().contains("meters → feet"));
    }
}
