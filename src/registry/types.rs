//! Registry types and structures

use crate::invocation::{CallContext, ToolHandler};
use crate::mcp::types::{Tool, ToolResult};
use prost_reflect::MethodDescriptor;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A backend method exposed as an MCP tool
#[derive(Clone)]
pub struct ToolDefinition {
    /// Tool identifier, unique across the tool list
    pub name: String,
    /// Source comments of the method, possibly empty
    pub description: String,
    /// Input schema, generated once at projection time
    pub input_schema: Arc<Value>,
    /// Handler bound to the method and the shared transport
    pub handler: Arc<dyn ToolHandler>,
    /// Method the tool calls
    pub method: MethodDescriptor,
}

impl ToolDefinition {
    pub fn new(
        name: String,
        description: String,
        input_schema: Value,
        handler: Arc<dyn ToolHandler>,
        method: MethodDescriptor,
    ) -> Self {
        Self {
            name,
            description,
            input_schema: Arc::new(input_schema),
            handler,
            method,
        }
    }

    /// Listing entry for `tools/list`
    pub fn to_mcp_tool(&self) -> Tool {
        Tool::new(
            self.name.clone(),
            self.description.clone(),
            self.input_schema.as_ref().clone(),
        )
    }

    /// Invoke the bound handler
    pub async fn call(&self, context: CallContext) -> ToolResult {
        self.handler.call(context).await
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("method", &self.method.full_name())
            .finish()
    }
}
