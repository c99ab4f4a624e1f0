//! Startup sequence
//!
//! Configuration to a ready `McpServer`: every step either completes or the
//! whole sequence returns an error before any tool is exposed.

use super::logger::StartupLogger;
use crate::config::BridgeConfig;
use crate::descriptors::{DescriptorRepository, ReflectionClient, Registry};
use crate::error::Result;
use crate::invocation::{build_channel, transport_for, EngineBinding};
use crate::mcp::{McpServer, ServerInfo};
use crate::registry::{JsonSchemaGenerator, MethodProjector, ToolDefinition};
use std::sync::Arc;

/// Descriptor repository described by the configuration
pub fn repository_for(config: &BridgeConfig) -> Result<DescriptorRepository> {
    let mut repository = DescriptorRepository::new();
    if let Some(path) = &config.descriptors {
        repository = repository.with_bundle_path(path.clone());
    }
    if config.reflect {
        // Reflection always speaks gRPC, whatever protocol tool calls use.
        let url = config.backend_url()?;
        let client = ReflectionClient::new(build_channel(&url)?, url.path(), config.header_set()?)
            .with_timeout(config.timeout());
        repository = repository.with_reflection(client);
    }
    Ok(repository)
}

/// Project the registry into tools bound to the configured backend
pub fn project_tools(config: &BridgeConfig, registry: &Registry) -> Result<Vec<ToolDefinition>> {
    let url = config.backend_url()?;
    let binding = EngineBinding::new(transport_for(&url, config.protocol)?, config.header_set()?)
        .with_timeout(config.timeout());
    let projector = MethodProjector::new(config.services.clone(), Arc::new(JsonSchemaGenerator::new()));
    Ok(projector.project(registry, &binding))
}

/// Run the full startup sequence
pub async fn build_server(config: &BridgeConfig) -> Result<McpServer> {
    config.validate()?;
    StartupLogger::display_configuration(config, crate::VERSION);

    let registry = repository_for(config)?.acquire().await?;
    let tools = project_tools(config, &registry)?;
    StartupLogger::display_tools(config, registry.file_count(), registry.service_count(), &tools);

    let info = ServerInfo {
        name: config.name.clone(),
        version: config.version.clone(),
    };
    Ok(McpServer::new(info, tools))
}
