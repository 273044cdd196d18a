use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use unitforge::cli;
use unitforge::config::{CliOverrides, KbConfig, OracleBackend};
use unitforge::error::KbResult;

#[derive(Parser)]
#[command(name = "unitforge")]
#[command(about = "Self-improving knowledge base of unit conversion formulas")]
#[command(long_about = "Unitforge - a knowledge base that learns unit conversions

Known conversions are answered from a graph of units. Unknown ones are
proposed by an oracle, checked against ten test cases and stored together
with their inverse once they score at least 80%.

COMMANDS:
  ask       - Answer a conversion question, learning the formula if needed
  train     - Generate questions and learn their formulas concurrently
  ingest    - Load known conversions from a YAML or JSON file
  lookup    - Show the stored formula for a unit pair
  list      - List every stored conversion
  evaluate  - Evaluate a formula for one input value
  invert    - Solve a formula for its input
  score     - Score a formula against a test case file

EXAMPLES:
  unitforge ask \"How do I convert meters to feet?\"
  unitforge train --cycles 3 --questions-per-cycle 20
  unitforge evaluate \"fahrenheit = celsius * 1.8 + 32\" 100
  unitforge invert \"centimeters = meters * 100\"")]
#[command(version)]
struct Cli {
    /// Configuration file (YAML); defaults apply when omitted
    #[arg(short, long, global = true, env = "UNITFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Conversion store file, overriding the configuration
    #[arg(short, long, global = true, env = "UNITFORGE_STORE")]
    store: Option<PathBuf>,

    /// Oracle backend, overriding the configuration
    #[arg(long, global = true, value_enum, env = "UNITFORGE_ORACLE")]
    oracle: Option<OracleBackend>,

    /// Log progress to stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a natural-language conversion question
    Ask {
        /// e.g. "How do I convert meters to feet?"
        question: String,
    },

    #[command(long_about = "Run training cycles.

Each cycle asks the oracle for fresh conversion questions and runs the full
acquisition loop for all of them concurrently. Failures are reported per
question and never stop the other questions or the next cycle.")]
    /// Generate questions and learn their formulas
    Train {
        /// Number of cycles
        #[arg(long)]
        cycles: Option<usize>,

        /// Questions generated per cycle
        #[arg(long)]
        questions_per_cycle: Option<usize>,

        /// Question generation prompt
        #[arg(long)]
        prompt: Option<String>,
    },

    #[command(long_about = "Ingest known conversions.

The file maps arbitrary keys to records:

  q1:
    from_unit: meters
    to_unit: centimeters
    formula: centimeters = meters * 100
    author: ops

Invalid records are skipped and reported; valid ones are stored with their
inverse where one exists.")]
    /// Load conversions from a YAML or JSON file
    Ingest {
        /// Path to the records file (.yaml or .json)
        file: PathBuf,

        /// Store records on worker threads
        #[arg(long)]
        concurrent: bool,
    },

    /// Show the stored formula for a unit pair
    Lookup {
        /// Source unit
        from: String,

        /// Target unit
        to: String,
    },

    /// List every stored conversion
    List,

    /// Evaluate a formula for one input value
    Evaluate {
        /// Formula such as "feet = meters * 3.28084"
        formula: String,

        /// Input value
        #[arg(allow_hyphen_values = true)]
        value: f64,

        /// Input variable name (defaults to the formula's only input)
        #[arg(long)]
        var: Option<String>,
    },

    /// Solve a formula for its input variable
    Invert {
        /// Formula such as "centimeters = meters * 100"
        formula: String,
    },

    /// Score a formula against test cases
    Score {
        /// Formula to score
        formula: String,

        /// YAML or JSON file with input_value/expected_output pairs
        cases_file: PathBuf,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "unitforge=warn",
        1 => "unitforge=info",
        _ => "unitforge=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> KbResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let overrides = CliOverrides {
        store_path: cli.store,
        oracle: cli.oracle,
    };
    let config = KbConfig::load(cli.config.as_deref(), &overrides)?;

    match cli.command {
        Commands::Ask { question } => cli::ask(&config, question).await,

        Commands::Train {
            cycles,
            questions_per_cycle,
            prompt,
        } => cli::train(&config, cycles, questions_per_cycle, prompt).await,

        Commands::Ingest { file, concurrent } => cli::ingest(&config, file, concurrent).await,

        Commands::Lookup { from, to } => cli::lookup(&config, from, to),

        Commands::List => cli::list(&config),

        Commands::Evaluate { formula, value, var } => cli::evaluate(formula, value, var),

        Commands::Invert { formula } => cli::invert(formula),

        Commands::Score {
            formula,
            cases_file,
        } => cli::score(&config, formula, cases_file),
    }
}
