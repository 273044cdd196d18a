//! CLI command handlers

pub mod commands;

pub use commands::{
    ask, build_agent, evaluate, ingest, invert, list, load_test_cases, lookup, open_gateway,
    score, train,
};
