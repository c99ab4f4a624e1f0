//! MCP (Model Context Protocol) implementation
//!
//! The JSON-RPC dispatcher and the stdio and HTTP transports that host it.

pub mod errors;
pub mod http;
pub mod server;
pub mod stdio;
pub mod types;

pub use errors::{McpError, McpErrorCode};
pub use http::{run_http, HttpState};
pub use server::McpServer;
pub use stdio::{run_stdio, serve_lines};
pub use types::*;
