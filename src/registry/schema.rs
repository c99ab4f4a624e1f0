//! JSON Schema generation from message descriptors
//!
//! Schemas follow the protobuf JSON mapping so that any argument object a
//! schema accepts decodes into the described message.

use prost_reflect::{FieldDescriptor, Kind, MessageDescriptor};
use serde_json::{json, Map, Value};

/// Produces the input schema advertised for a tool
pub trait SchemaGenerator: Send + Sync {
    /// Generate the schema for a message. The result is always an object schema.
    fn generate(&self, message: &MessageDescriptor) -> Value;
}

/// Default generator following the protobuf JSON mapping
#[derive(Debug, Clone, Default)]
pub struct JsonSchemaGenerator;

impl JsonSchemaGenerator {
    pub fn new() -> Self {
        Self
    }

    fn message_schema(&self, message: &MessageDescriptor, stack: &mut Vec<String>) -> Value {
        if let Some(schema) = well_known_schema(message.full_name()) {
            return schema;
        }
        if stack.iter().any(|name| name == message.full_name()) {
            return json!({ "type": "object" });
        }

        stack.push(message.full_name().to_string());
        let mut properties = Map::new();
        for field in message.fields() {
            properties.insert(field.name().to_string(), self.field_schema(&field, stack));
        }
        stack.pop();

        json!({
            "type": "object",
            "properties": Value::Object(properties),
        })
    }

    fn field_schema(&self, field: &FieldDescriptor, stack: &mut Vec<String>) -> Value {
        if field.is_map() {
            let value_schema = match field.kind() {
                Kind::Message(entry) => self.kind_schema(&entry.map_entry_value_field().kind(), stack),
                other => self.kind_schema(&other, stack),
            };
            return json!({
                "type": "object",
                "additionalProperties": value_schema,
            });
        }

        let item = self.kind_schema(&field.kind(), stack);
        if field.is_list() {
            json!({ "type": "array", "items": item })
        } else {
            item
        }
    }

    fn kind_schema(&self, kind: &Kind, stack: &mut Vec<String>) -> Value {
        match kind {
            Kind::Double | Kind::Float => json!({ "type": "number" }),
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => json!({ "type": "integer" }),
            Kind::Uint32 | Kind::Fixed32 => json!({ "type": "integer", "minimum": 0 }),
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 | Kind::Uint64 | Kind::Fixed64 => {
                json!({ "type": ["integer", "string"] })
            }
            Kind::Bool => json!({ "type": "boolean" }),
            Kind::String => json!({ "type": "string" }),
            Kind::Bytes => json!({ "type": "string", "contentEncoding": "base64" }),
            Kind::Enum(descriptor) => {
                let names: Vec<String> = descriptor.values().map(|v| v.name().to_string()).collect();
                json!({ "type": "string", "enum": names })
            }
            Kind::Message(message) => self.message_schema(message, stack),
        }
    }
}

impl SchemaGenerator for JsonSchemaGenerator {
    fn generate(&self, message: &MessageDescriptor) -> Value {
        let mut stack = Vec::new();
        match self.message_schema(message, &mut stack) {
            Value::Object(mut schema) => {
                // Well-known top-level inputs (e.g. Struct or Timestamp) still get an object schema.
                if schema.get("type") != Some(&json!("object")) {
                    schema = Map::new();
                    schema.insert("type".to_string(), json!("object"));
                }
                Value::Object(schema)
            }
            _ => json!({ "type": "object" }),
        }
    }
}

fn well_known_schema(full_name: &str) -> Option<Value> {
    let schema = match full_name {
        "google.protobuf.Timestamp" => json!({ "type": "string", "format": "date-time" }),
        "google.protobuf.Duration" => json!({ "type": "string", "pattern": "^-?[0-9]+(\\.[0-9]+)?s$" }),
        "google.protobuf.Struct" => json!({ "type": "object" }),
        "google.protobuf.Value" => json!({}),
        "google.protobuf.ListValue" => json!({ "type": "array" }),
        "google.protobuf.Empty" => json!({ "type": "object" }),
        "google.protobuf.FieldMask" => json!({ "type": "string" }),
        "google.protobuf.DoubleValue" | "google.protobuf.FloatValue" => json!({ "type": "number" }),
        "google.protobuf.Int32Value" => json!({ "type": "integer" }),
        "google.protobuf.UInt32Value" => json!({ "type": "integer", "minimum": 0 }),
        "google.protobuf.Int64Value" | "google.protobuf.UInt64Value" => {
            json!({ "type": ["integer", "string"] })
        }
        "google.protobuf.BoolValue" => json!({ "type": "boolean" }),
        "google.protobuf.StringValue" => json!({ "type": "string" }),
        "google.protobuf.BytesValue" => json!({ "type": "string", "contentEncoding": "base64" }),
        _ => return None,
    };
    Some(schema)
}
