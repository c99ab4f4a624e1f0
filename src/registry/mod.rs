//! Tool registry: schema generation and projection of methods into tools

pub mod projector;
pub mod schema;
pub mod types;

pub use projector::{tool_name, MethodProjector, MAX_TOOL_NAME_LEN};
pub use schema::{JsonSchemaGenerator, SchemaGenerator};
pub use types::ToolDefinition;
