//! Unitforge MCP Server
//!
//! Model Context Protocol server so AI tools can query and grow the
//! conversion knowledge base programmatically.
//!
//! ## Tools
//!
//! - `unitforge_ask` - Answer a conversion question, learning the formula if needed
//! - `unitforge_lookup` - Stored formula for a unit pair
//! - `unitforge_evaluate` - Evaluate a formula for one input
//! - `unitforge_invert` - Solve a formula for its input
//! - `unitforge_score` - Score a formula against test cases
//!
//! ## Usage
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "unitforge": {
//!       "command": "unitforge-mcp"
//!     }
//!   }
//! }
//! ```

pub mod server;

pub use server::UnitforgeMcpServer;
