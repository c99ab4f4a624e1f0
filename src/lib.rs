//! grpcmcp - expose gRPC and Connect services to MCP clients
//!
//! Protobuf descriptors, read from a bundle or discovered through server
//! reflection, drive everything: each unary method becomes an MCP tool with a
//! generated input schema, and calls are marshalled at runtime through
//! dynamic messages with no generated code.

pub mod config;
pub mod descriptors;
pub mod error;
pub mod invocation;
pub mod mcp;
pub mod registry;
pub mod startup;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
