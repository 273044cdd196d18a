//! Unitforge API Server binary
//!
//! HTTP REST API for the conversion knowledge base.
//! Provides ask, lookup, evaluate, invert, score and ingest endpoints.

use clap::Parser;
use std::path::PathBuf;
use unitforge::api::{run_api_server, ApiConfig};
use unitforge::config::{CliOverrides, KbConfig, OracleBackend};

#[derive(Parser, Debug)]
#[command(name = "unitforge-server")]
#[command(version)]
#[command(author = "RoyalBit Inc. <admin@royalbit.ca>")]
#[command(about = "Unitforge API Server - HTTP REST API for the unit conversion knowledge base")]
#[command(long_about = r#"
Unitforge API Server - HTTP REST API

Provides RESTful endpoints:
  - POST /api/v1/ask       - Answer a conversion question (learns if needed)
  - POST /api/v1/lookup    - Stored formula for a unit pair
  - POST /api/v1/evaluate  - Evaluate a formula
  - POST /api/v1/invert    - Solve a formula for its input
  - POST /api/v1/score     - Score a formula against test cases
  - POST /api/v1/ingest    - Store a batch of known conversions

Additional endpoints:
  - GET  /health           - Health check
  - GET  /version          - Server version info
  - GET  /                 - API documentation

Example usage:
  unitforge-server                           # Start on localhost:8080
  unitforge-server --host 0.0.0.0 --port 3000 --store kb.yaml

  curl -X POST http://localhost:8080/api/v1/ask \
    -H "Content-Type: application/json" \
    -d '{"question": "How do I convert meters to feet?"}'
"#)]
struct Args {
    /// Host address to bind to (use 0.0.0.0 for all interfaces)
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "UNITFORGE_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "UNITFORGE_PORT")]
    port: u16,

    /// Configuration file (YAML)
    #[arg(short, long, env = "UNITFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Conversion store file
    #[arg(short, long, env = "UNITFORGE_STORE")]
    store: Option<PathBuf>,

    /// Oracle backend
    #[arg(long, value_enum, env = "UNITFORGE_ORACLE")]
    oracle: Option<OracleBackend>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let overrides = CliOverrides {
        store_path: args.store,
        oracle: args.oracle,
    };
    let kb = KbConfig::load(args.config.as_deref(), &overrides)?;

    let config = ApiConfig {
        host: args.host,
        port: args.port,
    };

    run_api_server(config, kb).await
}
