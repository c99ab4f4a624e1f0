//! Startup summary logging

use crate::config::BridgeConfig;
use crate::registry::ToolDefinition;
use tracing::{debug, info};

/// Logs what the bridge is about to serve
pub struct StartupLogger;

impl StartupLogger {
    /// Configuration summary, logged before descriptors are acquired
    pub fn display_configuration(config: &BridgeConfig, crate_version: &str) {
        info!("grpcmcp v{} starting...", crate_version);
        info!("Backend: {} ({})", config.url, config.protocol);

        info!("Descriptor sources:");
        match &config.descriptors {
            Some(path) => info!("   Bundle: {}", path),
            None => info!("   Bundle: none"),
        }
        info!("   Reflection: {}", if config.reflect { "enabled" } else { "disabled" });

        if config.services.is_empty() {
            info!("Services: all");
        } else {
            info!("Services: {}", config.services.join(", "));
        }
        if !config.headers.is_empty() || config.bearer.is_some() || config.bearer_env.is_some() {
            info!("Static headers: {} configured", config.headers.len());
        }
        if let Some(secs) = config.timeout_secs {
            info!("Call timeout: {}s", secs);
        }
    }

    /// Tool summary, logged once projection is complete
    pub fn display_tools(config: &BridgeConfig, files: usize, services: usize, tools: &[ToolDefinition]) {
        info!("Registry: {} file(s), {} service(s)", files, services);
        info!("Exposing {} tool(s):", tools.len());
        for tool in tools {
            debug!("   {} -> {}", tool.name, tool.method.full_name());
        }

        let transport = match &config.hostport {
            Some(hostport) => format!("HTTP on {}", hostport),
            None => "stdio".to_string(),
        };
        info!("MCP server '{}' v{} ready ({})", config.name, config.version, transport);
    }
}
