//! Shared fixtures: a `pkg.Greeter` descriptor and in-process transports

#![allow(dead_code)]

pub mod backend;

use async_trait::async_trait;
use grpcmcp::descriptors::Registry;
use grpcmcp::invocation::{EngineBinding, HeaderSet, UnaryCall, UnaryTransport, WireProtocol};
use prost_reflect::{DynamicMessage, Value as ReflectValue};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::source_code_info::Location;
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, MethodDescriptorProto,
    ServiceDescriptorProto, SourceCodeInfo,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tonic::Status;

fn string_field(name: &str, number: i32) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        r#type: Some(Type::String as i32),
        label: Some(Label::Optional as i32),
        json_name: Some(name.to_string()),
        ..Default::default()
    }
}

fn method(name: &str, input: &str, output: &str, streaming: bool) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(input.to_string()),
        output_type: Some(output.to_string()),
        client_streaming: Some(streaming),
        server_streaming: Some(streaming),
        ..Default::default()
    }
}

/// `greeter.proto`: `pkg.Greeter.SayHello(HelloRequest{name}) -> HelloReply{greeting}`,
/// optionally with a bidirectional streaming `Chat` method
pub fn greeter_file(with_chat: bool) -> FileDescriptorProto {
    let mut methods = vec![method("SayHello", ".pkg.HelloRequest", ".pkg.HelloReply", false)];
    if with_chat {
        methods.push(method("Chat", ".pkg.HelloRequest", ".pkg.HelloReply", true));
    }

    FileDescriptorProto {
        name: Some("greeter.proto".to_string()),
        package: Some("pkg".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![
            DescriptorProto {
                name: Some("HelloRequest".to_string()),
                field: vec![string_field("name", 1)],
                ..Default::default()
            },
            DescriptorProto {
                name: Some("HelloReply".to_string()),
                field: vec![string_field("greeting", 1)],
                ..Default::default()
            },
        ],
        service: vec![ServiceDescriptorProto {
            name: Some("Greeter".to_string()),
            method: methods,
            ..Default::default()
        }],
        source_code_info: Some(SourceCodeInfo {
            location: vec![Location {
                path: vec![6, 0, 2, 0],
                span: vec![10, 2, 60],
                leading_comments: Some(" Sends a greeting.\n".to_string()),
                trailing_comments: Some(" Unary.\n".to_string()),
                leading_detached_comments: Vec::new(),
            }],
        }),
        ..Default::default()
    }
}

/// The greeter split in two: `greeter_service.proto` imports its messages from
/// `greeter_types.proto`. The importing file comes first.
pub fn split_greeter_files() -> Vec<FileDescriptorProto> {
    let full = greeter_file(false);
    let types = FileDescriptorProto {
        name: Some("greeter_types.proto".to_string()),
        package: full.package.clone(),
        syntax: full.syntax.clone(),
        message_type: full.message_type.clone(),
        ..Default::default()
    };
    let service = FileDescriptorProto {
        name: Some("greeter_service.proto".to_string()),
        dependency: vec!["greeter_types.proto".to_string()],
        message_type: Vec::new(),
        ..full
    };
    vec![service, types]
}

pub fn greeter_registry(with_chat: bool) -> Registry {
    Registry::link(vec![greeter_file(with_chat)]).expect("greeter descriptor links")
}

/// Answers `SayHello` with `Hello, <name>` and records the headers of every call
#[derive(Default)]
pub struct EchoTransport {
    pub seen_headers: Mutex<Vec<HeaderSet>>,
}

#[async_trait]
impl UnaryTransport for EchoTransport {
    async fn unary(&self, call: UnaryCall) -> Result<DynamicMessage, Status> {
        self.seen_headers
            .lock()
            .expect("header log lock")
            .push(call.headers.clone());

        let name = call
            .request
            .get_field_by_name("name")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        let mut reply = DynamicMessage::new(call.method.output());
        reply.set_field_by_name("greeting", ReflectValue::String(format!("Hello, {}", name)));
        Ok(reply)
    }

    fn protocol(&self) -> WireProtocol {
        WireProtocol::Grpc
    }
}

/// Fails every call with a fixed status
pub struct FailingTransport(pub Status);

#[async_trait]
impl UnaryTransport for FailingTransport {
    async fn unary(&self, _call: UnaryCall) -> Result<DynamicMessage, Status> {
        Err(self.0.clone())
    }

    fn protocol(&self) -> WireProtocol {
        WireProtocol::Grpc
    }
}

/// Never answers
pub struct HangingTransport;

#[async_trait]
impl UnaryTransport for HangingTransport {
    async fn unary(&self, _call: UnaryCall) -> Result<DynamicMessage, Status> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(Status::internal("unreachable"))
    }

    fn protocol(&self) -> WireProtocol {
        WireProtocol::Grpc
    }
}

pub fn binding(transport: Arc<dyn UnaryTransport>) -> EngineBinding {
    EngineBinding::new(transport, HeaderSet::new())
}
