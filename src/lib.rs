//! Unitforge - a self-improving knowledge base of unit conversions
//!
//! Conversion formulas live in a directed graph of units. When a question
//! names a pair the graph has never seen, a language oracle proposes a
//! formula and a set of test cases; the formula is scored against the cases
//! and retried with feedback until it passes or the attempts run out. Every
//! accepted formula is stored together with its algebraic inverse.
//!
//! # Features
//!
//! - Arithmetic formula parser and evaluator (`+ - * / **`, unary minus)
//! - Symbolic inversion of single-variable formulas
//! - Test-case scoring with absolute tolerance and markdown feedback
//! - YAML-persisted conversion graph with automatic inverse edges
//! - Pluggable oracles: an offline rule oracle and an OpenAI-compatible client
//! - CLI, HTTP API and MCP server front ends
//!
//! # Example
//!
//! ```
//! use unitforge::core::{evaluate_formula, invert_formula};
//!
//! let value = evaluate_formula("fahrenheit = celsius * 1.8 + 32", "celsius", 100.0)?;
//! assert_eq!(value, 212.0);
//!
//! let inverse = invert_formula("centimeters = meters * 100")?;
//! assert_eq!(inverse, "meters = centimeters / 100");
//! # Ok::<(), unitforge::core::FormulaError>(())
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod ingest;
pub mod mcp;
pub mod oracle;
pub mod store;
pub mod training;
pub mod types;

// Re-export commonly used types
pub use config::KbConfig;
pub use crate::core::{Agent, Outcome};
pub use error::{KbError, KbResult};
pub use store::{GraphStore, StoreGateway};
pub use types::{ConversionRelation, TestCase, UnitPair};
