//! In-process tonic backend serving `pkg.Greeter.SayHello`, optionally with
//! server reflection

use grpcmcp::descriptors::{linkage_order, Registry};
use grpcmcp::invocation::DynamicCodec;
use prost_reflect::{DynamicMessage, MethodDescriptor, Value as ReflectValue};
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::body::BoxBody;
use tonic::codegen::{empty_body, http, Body, BoxFuture, Service, StdError};
use tonic::metadata::MetadataMap;
use tonic::server::{Grpc, NamedService, UnaryService};
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use url::Url;

/// Answers `Hello, <name>`; `missing` fails with NOT_FOUND and `slow` never
/// answers in time
#[derive(Clone)]
pub struct GreeterBackend {
    method: MethodDescriptor,
    seen: Arc<Mutex<Vec<MetadataMap>>>,
}

struct SayHello {
    method: MethodDescriptor,
    seen: Arc<Mutex<Vec<MetadataMap>>>,
}

impl UnaryService<DynamicMessage> for SayHello {
    type Response = DynamicMessage;
    type Future = BoxFuture<Response<DynamicMessage>, Status>;

    fn call(&mut self, request: Request<DynamicMessage>) -> Self::Future {
        self.seen
            .lock()
            .expect("metadata log lock")
            .push(request.metadata().clone());
        let output = self.method.output();

        Box::pin(async move {
            let name = request
                .get_ref()
                .get_field_by_name("name")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();

            match name.as_str() {
                "missing" => Err(Status::not_found("no such greeter")),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(Status::internal("too late"))
                }
                _ => {
                    let mut reply = DynamicMessage::new(output);
                    reply.set_field_by_name("greeting", ReflectValue::String(format!("Hello, {}", name)));
                    Ok(Response::new(reply))
                }
            }
        })
    }
}

impl<B> Service<http::Request<B>> for GreeterBackend
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        if request.uri().path() != "/pkg.Greeter/SayHello" {
            return Box::pin(async move {
                Ok(http::Response::builder()
                    .status(200)
                    .header("grpc-status", "12")
                    .header("content-type", "application/grpc")
                    .body(empty_body())
                    .expect("static response"))
            });
        }

        let handler = SayHello {
            method: self.method.clone(),
            seen: Arc::clone(&self.seen),
        };
        let codec = DynamicCodec::new(self.method.input());
        Box::pin(async move {
            let mut grpc = Grpc::new(codec);
            Ok(grpc.unary(handler, request).await)
        })
    }
}

impl NamedService for GreeterBackend {
    const NAME: &'static str = "pkg.Greeter";
}

/// A running backend
pub struct Backend {
    pub addr: SocketAddr,
    pub seen: Arc<Mutex<Vec<MetadataMap>>>,
}

impl Backend {
    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).expect("backend url")
    }

    /// Metadata of every `SayHello` call received so far
    pub fn seen_metadata(&self) -> Vec<MetadataMap> {
        self.seen.lock().expect("metadata log lock").clone()
    }
}

/// Serve `files` (which must define `pkg.Greeter`) on an ephemeral port.
/// With `reflection`, a `grpc.reflection.v1alpha` service describes them.
pub async fn spawn_backend(files: Vec<FileDescriptorProto>, reflection: bool) -> Backend {
    let ordered = linkage_order(files.clone()).expect("backend descriptors are complete");
    let registry = Registry::link(ordered).expect("backend descriptors link");
    let method = registry
        .find_method("pkg.Greeter", "SayHello")
        .expect("backend defines pkg.Greeter.SayHello");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let greeter = GreeterBackend {
        method,
        seen: Arc::clone(&seen),
    };

    let reflection_service = reflection.then(|| {
        tonic_reflection::server::Builder::configure()
            .register_file_descriptor_set(FileDescriptorSet { file: files })
            .include_reflection_service(false)
            .build()
            .expect("reflection service builds")
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind backend");
    let addr = listener.local_addr().expect("backend address");
    tokio::spawn(
        Server::builder()
            .add_service(greeter)
            .add_optional_service(reflection_service)
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );

    Backend { addr, seen }
}

/// An address nothing listens on
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("address")
}
