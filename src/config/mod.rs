//! Configuration module
//!
//! Configuration loading and validation for the bridge.

mod config;

pub use config::{
    parse_service_list, BridgeConfig, EnvFile, DEFAULT_BACKEND_URL, DEFAULT_LOG_LEVEL, DEFAULT_SERVER_NAME,
    DEFAULT_SERVER_VERSION,
};
