//! Backend transports for unary calls
//!
//! Two wire protocols are supported behind one trait: native gRPC over a
//! tonic channel, and the Connect unary protocol over plain HTTP. Both report
//! failures as `tonic::Status` so the engine renders them the same way.

use super::codec::DynamicCodec;
use super::headers::HeaderSet;
use super::status::{code_from_http_status, code_from_name};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use http::uri::PathAndQuery;
use prost::Message;
use prost_reflect::{DynamicMessage, MethodDescriptor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Code, Request, Status};
use tracing::debug;
use url::Url;

/// Wire protocol spoken to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireProtocol {
    /// gRPC over HTTP/2
    #[default]
    Grpc,
    /// Connect unary protocol with binary protobuf bodies
    Connect,
}

impl fmt::Display for WireProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireProtocol::Grpc => write!(f, "grpc"),
            WireProtocol::Connect => write!(f, "connect"),
        }
    }
}

/// One outbound unary exchange
#[derive(Debug, Clone)]
pub struct UnaryCall {
    /// Method being called; its output type drives response decoding
    pub method: MethodDescriptor,
    /// Request message typed by the method input
    pub request: DynamicMessage,
    /// Headers already merged for this call
    pub headers: HeaderSet,
    /// Deadline propagated to the backend
    pub timeout: Option<Duration>,
}

/// Performs exactly one request/response exchange per call
#[async_trait]
pub trait UnaryTransport: Send + Sync {
    /// Send the request and return the response typed by the method output
    async fn unary(&self, call: UnaryCall) -> std::result::Result<DynamicMessage, Status>;

    /// Protocol name for logging
    fn protocol(&self) -> WireProtocol;
}

/// `<base path>/<package.Service>/<Method>`
pub fn procedure_path(base_path: &str, method: &MethodDescriptor) -> String {
    format!(
        "{}/{}/{}",
        base_path.trim_end_matches('/'),
        method.parent_service().full_name(),
        method.name()
    )
}

/// Parse and check a backend base URL
pub fn parse_backend_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| BridgeError::config(format!("invalid backend url '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(BridgeError::config(format!(
                "unsupported backend url scheme '{}' (expected http or https)",
                other
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(BridgeError::config(format!("backend url '{}' has no host", raw)));
    }
    Ok(url)
}

/// Build a lazily connecting channel. `https` gets rustls, `http` is plaintext HTTP/2.
pub fn build_channel(url: &Url) -> Result<Channel> {
    let origin = url.origin().ascii_serialization();
    let mut endpoint = Endpoint::from_shared(origin.clone())
        .map_err(|e| BridgeError::transport(format!("invalid endpoint '{}': {}", origin, e)))?;

    if url.scheme() == "https" {
        let mut tls = ClientTlsConfig::new();
        if let Some(host) = url.host_str() {
            tls = tls.domain_name(host);
        }
        endpoint = endpoint
            .tls_config(tls)
            .map_err(|e| BridgeError::transport(format!("failed to configure TLS: {}", e)))?;
    }

    debug!("Prepared {} channel to {}", url.scheme(), origin);
    Ok(endpoint.connect_lazy())
}

/// Build the transport for a protocol
pub fn transport_for(url: &Url, protocol: WireProtocol) -> Result<Arc<dyn UnaryTransport>> {
    Ok(match protocol {
        WireProtocol::Grpc => Arc::new(GrpcTransport::new(url)?),
        WireProtocol::Connect => Arc::new(ConnectTransport::new(url)?),
    })
}

/// gRPC transport over a shared tonic channel
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    channel: Channel,
    base_path: String,
}

impl GrpcTransport {
    /// Create a transport for the backend at `url`
    pub fn new(url: &Url) -> Result<Self> {
        Ok(Self::with_channel(build_channel(url)?, url.path()))
    }

    /// Create a transport over an existing channel
    pub fn with_channel(channel: Channel, base_path: &str) -> Self {
        Self {
            channel,
            base_path: base_path.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl UnaryTransport for GrpcTransport {
    async fn unary(&self, call: UnaryCall) -> std::result::Result<DynamicMessage, Status> {
        let path = procedure_path(&self.base_path, &call.method);
        let path = PathAndQuery::try_from(path.as_str())
            .map_err(|e| Status::internal(format!("invalid procedure path '{}': {}", path, e)))?;

        let mut request = Request::new(call.request);
        call.headers.apply_to_metadata(request.metadata_mut());
        if let Some(timeout) = call.timeout {
            request.set_timeout(timeout);
        }

        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("backend not ready: {}", e)))?;

        let codec = DynamicCodec::new(call.method.output());
        let response = grpc
            .unary(request, path, codec)
            .await
            .map_err(unavailable_if_transport)?;
        Ok(response.into_inner())
    }

    fn protocol(&self) -> WireProtocol {
        WireProtocol::Grpc
    }
}

/// tonic reports connection failures as UNKNOWN with the transport error as
/// source; they are network failures, so surface them as UNAVAILABLE.
fn unavailable_if_transport(status: Status) -> Status {
    let from_transport = status.code() == Code::Unknown
        && std::error::Error::source(&status)
            .map_or(false, |source| source.is::<tonic::transport::Error>());
    if from_transport {
        let detail = std::error::Error::source(&status)
            .and_then(std::error::Error::source)
            .map(|cause| format!("{}: {}", status.message(), cause))
            .unwrap_or_else(|| status.message().to_string());
        Status::unavailable(detail)
    } else {
        status
    }
}

/// Error body returned by Connect servers
#[derive(Debug, Deserialize)]
struct ConnectErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

/// Connect unary transport over reqwest
#[derive(Debug, Clone)]
pub struct ConnectTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ConnectTransport {
    /// Create a transport for the backend at `url`
    pub fn new(url: &Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BridgeError::transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, url))
    }

    /// Create a transport with a preconfigured client
    pub fn with_client(client: reqwest::Client, url: &Url) -> Self {
        let base_url = format!(
            "{}{}",
            url.origin().ascii_serialization(),
            url.path().trim_end_matches('/')
        );
        Self { client, base_url }
    }

    fn error_from_response(status: reqwest::StatusCode, body: &[u8]) -> Status {
        match serde_json::from_slice::<ConnectErrorBody>(body) {
            Ok(error) => Status::new(code_from_name(&error.code), error.message),
            Err(_) => Status::new(
                code_from_http_status(status.as_u16()),
                format!("HTTP status {}", status),
            ),
        }
    }
}

#[async_trait]
impl UnaryTransport for ConnectTransport {
    async fn unary(&self, call: UnaryCall) -> std::result::Result<DynamicMessage, Status> {
        let url = format!("{}{}", self.base_url, procedure_path("", &call.method));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/proto"));
        headers.insert("connect-protocol-version", HeaderValue::from_static("1"));
        if let Some(timeout) = call.timeout {
            if let Ok(value) = HeaderValue::from_str(&timeout.as_millis().to_string()) {
                headers.insert("connect-timeout-ms", value);
            }
        }
        call.headers.apply_to_headers(&mut headers);

        let mut builder = self
            .client
            .post(&url)
            .headers(headers)
            .body(call.request.encode_to_vec());
        if let Some(timeout) = call.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(status_from_reqwest)?;
        let status = response.status();
        let body = response.bytes().await.map_err(status_from_reqwest)?;

        if !status.is_success() {
            return Err(Self::error_from_response(status, &body));
        }

        DynamicMessage::decode(call.method.output(), body).map_err(|e| {
            Status::internal(format!(
                "failed to decode {} response: {}",
                call.method.output().full_name(),
                e
            ))
        })
    }

    fn protocol(&self) -> WireProtocol {
        WireProtocol::Connect
    }
}

fn status_from_reqwest(error: reqwest::Error) -> Status {
    if error.is_timeout() {
        Status::new(Code::DeadlineExceeded, error.to_string())
    } else {
        Status::new(Code::Unavailable, error.to_string())
    }
}
