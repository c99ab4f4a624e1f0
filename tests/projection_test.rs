//! Method projection tests

mod common;

use common::{binding, greeter_file, greeter_registry, EchoTransport};
use grpcmcp::descriptors::{DescriptorRepository, Registry};
use grpcmcp::invocation::CallContext;
use grpcmcp::registry::{JsonSchemaGenerator, MethodProjector, SchemaGenerator};
use prost::Message;
use prost_reflect::MessageDescriptor;
use prost_types::{FileDescriptorProto, FileDescriptorSet, MethodDescriptorProto, ServiceDescriptorProto};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn projector(services: &[&str]) -> MethodProjector {
    MethodProjector::new(
        services.iter().map(|s| s.to_string()),
        Arc::new(JsonSchemaGenerator::new()),
    )
}

#[test]
fn test_greeter_projects_one_tool() {
    let registry = greeter_registry(false);
    let tools = projector(&[]).project(&registry, &binding(Arc::new(EchoTransport::default())));

    assert_eq!(tools.len(), 1);
    let tool = &tools[0];
    assert_eq!(tool.name, "pkg_Greeter__SayHello");
    assert_eq!(tool.description, "Sends a greeting. | Unary.");
    assert_eq!(tool.method.full_name(), "pkg.Greeter.SayHello");
    assert_eq!(
        *tool.input_schema,
        json!({
            "type": "object",
            "properties": { "name": { "type": "string" } }
        })
    );
}

#[test]
fn test_streaming_method_is_excluded() {
    let registry = greeter_registry(true);
    let tools = projector(&[]).project(&registry, &binding(Arc::new(EchoTransport::default())));

    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "pkg_Greeter__SayHello");
}

#[test]
fn test_allow_list_without_match_yields_nothing() {
    let registry = greeter_registry(false);
    let tools = projector(&["other.Missing"]).project(&registry, &binding(Arc::new(EchoTransport::default())));
    assert!(tools.is_empty());
}

#[test]
fn test_allow_list_with_match() {
    let registry = greeter_registry(false);
    let tools = projector(&["pkg.Greeter"]).project(&registry, &binding(Arc::new(EchoTransport::default())));
    assert_eq!(tools.len(), 1);
}

#[test]
fn test_missing_comments_give_empty_description() {
    let mut file = greeter_file(false);
    file.source_code_info = None;
    let registry = Registry::link(vec![file]).unwrap();
    let tools = projector(&[]).project(&registry, &binding(Arc::new(EchoTransport::default())));

    assert_eq!(tools[0].description, "");
    assert!(tools[0].to_mcp_tool().description.is_none());
}

#[test]
fn test_colliding_names_keep_first() {
    // `a.b_c.S` and `a_b.c.S` both normalize to `a_b_c_S__Ping`.
    fn file(name: &str, package: &str) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.to_string()),
            package: Some(package.to_string()),
            syntax: Some("proto3".to_string()),
            dependency: vec!["google/protobuf/empty.proto".to_string()],
            service: vec![ServiceDescriptorProto {
                name: Some("S".to_string()),
                method: vec![MethodDescriptorProto {
                    name: Some("Ping".to_string()),
                    input_type: Some(".google.protobuf.Empty".to_string()),
                    output_type: Some(".google.protobuf.Empty".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    let empty = prost_reflect::DescriptorPool::global()
        .get_file_by_name("google/protobuf/empty.proto")
        .unwrap()
        .file_descriptor_proto()
        .clone();
    let registry = Registry::link(vec![empty, file("one.proto", "a.b_c"), file("two.proto", "a_b.c")]).unwrap();
    let tools = projector(&[]).project(&registry, &binding(Arc::new(EchoTransport::default())));

    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].method.full_name(), "a.b_c.S.Ping");

    let names: HashSet<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names.len(), tools.len());
}

struct CountingGenerator {
    calls: AtomicUsize,
    inner: JsonSchemaGenerator,
}

impl SchemaGenerator for CountingGenerator {
    fn generate(&self, message: &MessageDescriptor) -> Value {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.generate(message)
    }
}

#[tokio::test]
async fn test_schema_generated_once_per_tool() {
    let generator = Arc::new(CountingGenerator {
        calls: AtomicUsize::new(0),
        inner: JsonSchemaGenerator::new(),
    });
    let projector = MethodProjector::new(Vec::<String>::new(), generator.clone());
    let tools = projector.project(&greeter_registry(false), &binding(Arc::new(EchoTransport::default())));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    for name in ["Ada", "Grace", "Linus"] {
        let result = tools[0].call(CallContext::new(json!({ "name": name }))).await;
        assert!(!result.is_error);
        let listed = tools[0].to_mcp_tool();
        assert_eq!(listed.input_schema["type"], "object");
    }
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bundle_file_scenario() {
    let bundle = FileDescriptorSet {
        file: vec![greeter_file(true)],
    };
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&bundle.encode_to_vec()).unwrap();

    let registry = DescriptorRepository::new()
        .with_bundle_path(file.path().to_string_lossy().to_string())
        .acquire()
        .await
        .unwrap();
    assert_eq!(registry.service_count(), 1);
    assert!(registry.find_method("pkg.Greeter", "SayHello").is_some());

    let tools = projector(&[]).project(&registry, &binding(Arc::new(EchoTransport::default())));
    assert_eq!(tools.len(), 1);

    let result = tools[0].call(CallContext::new(json!({ "name": "Ada" }))).await;
    assert!(!result.is_error);
    assert_eq!(result.first_text(), Some(r#"{"greeting":"Hello, Ada"}"#));
}
