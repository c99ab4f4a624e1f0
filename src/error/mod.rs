//! Error handling module for the bridge
//!
//! Startup failures and per-call failures share one error type; the tool
//! host decides which of them become error-flagged tool results.

mod error;

// Re-export the main error types and utilities
pub use error::{BridgeError, Result};
