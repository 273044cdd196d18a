//! Unitforge MCP Server binary
//!
//! Model Context Protocol server for AI agent integration.
//! Run with: `unitforge-mcp`
//!
//! Configure in an MCP client:
//! ```json
//! {
//!   "mcpServers": {
//!     "unitforge": {
//!       "command": "unitforge-mcp",
//!       "env": { "UNITFORGE_STORE": "/path/to/conversions.yaml" }
//!     }
//!   }
//! }
//! ```

use clap::Parser;
use std::path::PathBuf;
use unitforge::cli::build_agent;
use unitforge::config::{CliOverrides, KbConfig, OracleBackend};
use unitforge::mcp::UnitforgeMcpServer;

#[derive(Parser, Debug)]
#[command(name = "unitforge-mcp")]
#[command(version)]
#[command(about = "Unitforge MCP Server - JSON-RPC over stdio")]
struct Args {
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

    // stdout carries the protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unitforge=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let overrides = CliOverrides {
        store_path: args.store,
        oracle: args.oracle,
    };
    let config = KbConfig::load(args.config.as_deref(), &overrides)?;
    let (agent, _) = build_agent(&config)?;

    UnitforgeMcpServer::new(agent).run().await?;
    Ok(())
}
