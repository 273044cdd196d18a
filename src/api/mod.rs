//! Unitforge API Server module
//!
//! Provides the HTTP REST API. Run with `unitforge-server`.

pub mod handlers;
pub mod server;

pub use server::{build_router, run_api_server, ApiConfig, AppState};
