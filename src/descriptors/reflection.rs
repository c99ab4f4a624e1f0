//! gRPC server reflection client
//!
//! Speaks `grpc.reflection.v1` and falls back to `grpc.reflection.v1alpha`
//! when the server does not implement the newer service. Both versions share
//! the same message layout, so the generated v1alpha types serve both and
//! only the method path differs.

use super::linkage::DescriptorSet;
use crate::error::{BridgeError, Result};
use crate::invocation::HeaderSet;
use prost::Message;
use prost_types::FileDescriptorProto;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::codec::{ProstCodec, Streaming};
use tonic::transport::Channel;
use tonic::{Code, Request};
use tonic_reflection::pb::server_reflection_request::MessageRequest;
use tonic_reflection::pb::server_reflection_response::MessageResponse;
use tonic_reflection::pb::{ServerReflectionRequest, ServerReflectionResponse};
use tracing::{debug, info};

const REFLECTION_V1: &str = "/grpc.reflection.v1.ServerReflection/ServerReflectionInfo";
const REFLECTION_V1ALPHA: &str = "/grpc.reflection.v1alpha.ServerReflection/ServerReflectionInfo";

/// Client fetching descriptors from a live backend
#[derive(Debug, Clone)]
pub struct ReflectionClient {
    channel: Channel,
    base_path: String,
    headers: HeaderSet,
    timeout: Option<Duration>,
}

impl ReflectionClient {
    /// Create a client over a channel to the backend
    pub fn new(channel: Channel, base_path: &str, headers: HeaderSet) -> Self {
        Self {
            channel,
            base_path: base_path.trim_end_matches('/').to_string(),
            headers,
            timeout: None,
        }
    }

    /// Bound the whole discovery session
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// List every service and collect the files defining them and their imports
    pub async fn fetch(&self) -> Result<DescriptorSet> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.fetch_with_fallback())
                .await
                .map_err(|_| {
                    BridgeError::discovery(format!(
                        "reflection did not complete within {}s",
                        timeout.as_secs()
                    ))
                })?,
            None => self.fetch_with_fallback().await,
        }
    }

    async fn fetch_with_fallback(&self) -> Result<DescriptorSet> {
        match self.fetch_from(REFLECTION_V1).await {
            Err(BridgeError::Status(status)) if status.code() == Code::Unimplemented => {
                debug!("Server lacks grpc.reflection.v1, retrying with v1alpha");
                self.fetch_from(REFLECTION_V1ALPHA).await
            }
            other => other,
        }
    }

    async fn fetch_from(&self, service_path: &str) -> Result<DescriptorSet> {
        let mut session = ReflectionSession::open(self, service_path).await?;

        let services = session.list_services().await?;
        info!("Reflection reported {} service(s)", services.len());

        let mut set = DescriptorSet::new();
        for service in &services {
            let files = session.file_containing_symbol(service).await?;
            set.extend(files);
        }

        // Some servers only send files not yet sent on this stream, or omit imports.
        loop {
            let missing = set.missing_dependencies();
            if missing.is_empty() {
                break;
            }
            for name in missing {
                debug!("Fetching missing dependency {}", name);
                let files = session.file_by_filename(&name).await?;
                if !files.iter().any(|f| f.name() == name) {
                    return Err(BridgeError::discovery(format!(
                        "server did not return requested file '{}'",
                        name
                    )));
                }
                set.extend(files);
            }
        }

        session.close().await;
        Ok(set)
    }
}

/// One bidirectional reflection stream
struct ReflectionSession {
    sender: Option<mpsc::Sender<ServerReflectionRequest>>,
    inbound: Streaming<ServerReflectionResponse>,
}

impl ReflectionSession {
    async fn open(client: &ReflectionClient, service_path: &str) -> Result<Self> {
        let path = format!("{}{}", client.base_path, service_path);
        let path = http::uri::PathAndQuery::try_from(path.as_str())
            .map_err(|e| BridgeError::discovery(format!("invalid reflection path: {}", e)))?;

        let (sender, receiver) = mpsc::channel(4);
        let mut request = Request::new(ReceiverStream::new(receiver));
        client.headers.apply_to_metadata(request.metadata_mut());

        let mut grpc = tonic::client::Grpc::new(client.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| BridgeError::discovery(format!("backend unreachable: {}", e)))?;

        // Queue the first request before the call so servers that wait for
        // a message before sending headers do not stall.
        sender
            .send(list_services_request())
            .await
            .map_err(|_| BridgeError::discovery("reflection stream closed"))?;

        let response = grpc
            .streaming(request, path, ProstCodec::<ServerReflectionRequest, ServerReflectionResponse>::default())
            .await?;

        Ok(Self {
            sender: Some(sender),
            inbound: response.into_inner(),
        })
    }

    async fn receive(&mut self) -> Result<MessageResponse> {
        let response = self
            .inbound
            .message()
            .await?
            .ok_or_else(|| BridgeError::discovery("reflection stream ended unexpectedly"))?;

        match response.message_response {
            Some(MessageResponse::ErrorResponse(error)) => Err(BridgeError::discovery(format!(
                "reflection error {}: {}",
                error.error_code, error.error_message
            ))),
            Some(other) => Ok(other),
            None => Err(BridgeError::discovery("empty reflection response")),
        }
    }

    async fn round_trip(&mut self, request: MessageRequest) -> Result<MessageResponse> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| BridgeError::discovery("reflection stream already closed"))?;
        sender
            .send(ServerReflectionRequest {
                host: String::new(),
                message_request: Some(request),
            })
            .await
            .map_err(|_| BridgeError::discovery("reflection stream closed"))?;
        self.receive().await
    }

    async fn list_services(&mut self) -> Result<Vec<String>> {
        // The list request was queued when the stream was opened.
        match self.receive().await? {
            MessageResponse::ListServicesResponse(list) => {
                Ok(list.service.into_iter().map(|s| s.name).collect())
            }
            _ => Err(BridgeError::discovery("unexpected reply to list_services")),
        }
    }

    async fn file_containing_symbol(&mut self, symbol: &str) -> Result<Vec<FileDescriptorProto>> {
        let reply = self
            .round_trip(MessageRequest::FileContainingSymbol(symbol.to_string()))
            .await?;
        decode_files(reply)
    }

    async fn file_by_filename(&mut self, name: &str) -> Result<Vec<FileDescriptorProto>> {
        let reply = self
            .round_trip(MessageRequest::FileByFilename(name.to_string()))
            .await?;
        decode_files(reply)
    }

    async fn close(mut self) {
        // Half-close and drain whatever the server still sends.
        self.sender.take();
        while let Ok(Some(_)) = self.inbound.message().await {}
    }
}

fn list_services_request() -> ServerReflectionRequest {
    ServerReflectionRequest {
        host: String::new(),
        message_request: Some(MessageRequest::ListServices(String::new())),
    }
}

fn decode_files(reply: MessageResponse) -> Result<Vec<FileDescriptorProto>> {
    match reply {
        MessageResponse::FileDescriptorResponse(files) => files
            .file_descriptor_proto
            .iter()
            .map(|bytes| FileDescriptorProto::decode(bytes.as_slice()).map_err(BridgeError::from))
            .collect(),
        _ => Err(BridgeError::discovery("unexpected reply to file request")),
    }
}
