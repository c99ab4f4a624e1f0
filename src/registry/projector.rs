//! Method projection
//!
//! Turns the unary methods of the linked registry into tool definitions.
//! Projection runs once at startup; the resulting list is immutable.

use super::schema::SchemaGenerator;
use super::types::ToolDefinition;
use crate::descriptors::Registry;
use crate::invocation::EngineBinding;
use prost_reflect::{FileDescriptor, MethodDescriptor};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest identifier some MCP clients accept
pub const MAX_TOOL_NAME_LEN: usize = 64;

// FileDescriptorProto.service = 6, ServiceDescriptorProto.method = 2
const SERVICE_FIELD: i32 = 6;
const METHOD_FIELD: i32 = 2;

/// Tool identifier for a method: `<service>__<method>` with dots replaced
pub fn tool_name(service_full_name: &str, method_name: &str) -> String {
    format!("{}__{}", service_full_name, method_name).replace('.', "_")
}

/// Projects registry methods into tool definitions
#[derive(Clone)]
pub struct MethodProjector {
    allow_list: HashSet<String>,
    schemas: Arc<dyn SchemaGenerator>,
}

impl MethodProjector {
    /// Create a projector. An empty allow-list admits every service.
    pub fn new<I, S>(allow_list: I, schemas: Arc<dyn SchemaGenerator>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow_list: allow_list.into_iter().map(Into::into).collect(),
            schemas,
        }
    }

    fn allows(&self, service: &str) -> bool {
        self.allow_list.is_empty() || self.allow_list.contains(service)
    }

    /// Build one tool per unary method of every allowed service
    pub fn project(&self, registry: &Registry, binding: &EngineBinding) -> Vec<ToolDefinition> {
        let mut tools = Vec::new();
        let mut taken: HashSet<String> = HashSet::new();

        for file in registry.files() {
            for (service_index, service) in file.services().enumerate() {
                if !self.allows(service.full_name()) {
                    debug!("Service {} not in allow-list, skipping", service.full_name());
                    continue;
                }

                for (method_index, method) in service.methods().enumerate() {
                    if method.is_client_streaming() || method.is_server_streaming() {
                        debug!("Skipping streaming method {}", method.full_name());
                        continue;
                    }

                    let name = tool_name(service.full_name(), method.name());
                    if !taken.insert(name.clone()) {
                        warn!(
                            "Tool name {} for {} collides with an earlier tool, skipping",
                            name,
                            method.full_name()
                        );
                        continue;
                    }
                    if name.len() > MAX_TOOL_NAME_LEN {
                        warn!(
                            "Tool name {} is {} characters long; some clients reject names over {}",
                            name,
                            name.len(),
                            MAX_TOOL_NAME_LEN
                        );
                    }

                    let description = method_description(&file, service_index, method_index);
                    tools.push(self.define(name, description, method, binding));
                }
            }
        }

        if !self.allow_list.is_empty() && tools.is_empty() {
            warn!("Service allow-list matched no unary methods");
        }
        info!("Projected {} tool(s)", tools.len());
        tools
    }

    fn define(
        &self,
        name: String,
        description: String,
        method: MethodDescriptor,
        binding: &EngineBinding,
    ) -> ToolDefinition {
        let input_schema = self.schemas.generate(&method.input());
        let handler = Arc::new(binding.bind(method.clone()));
        ToolDefinition::new(name, description, input_schema, handler, method)
    }
}

/// Leading and trailing comments of a method, trimmed and joined with `" | "`
fn method_description(file: &FileDescriptor, service_index: usize, method_index: usize) -> String {
    let path = [
        SERVICE_FIELD,
        service_index as i32,
        METHOD_FIELD,
        method_index as i32,
    ];

    let Some(info) = &file.file_descriptor_proto().source_code_info else {
        return String::new();
    };
    let Some(location) = info.location.iter().find(|l| l.path == path) else {
        return String::new();
    };

    [location.leading_comments(), location.trailing_comments()]
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}
