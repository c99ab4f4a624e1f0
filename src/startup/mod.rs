//! Startup sequence and summary logging

pub mod bridge;
pub mod logger;

pub use bridge::{build_server, project_tools, repository_for};
pub use logger::StartupLogger;
