//! Dynamic invocation engine
//!
//! Every projected tool is backed by a `DynamicInvoker`: it turns the
//! caller's JSON arguments into a request typed by the method's input
//! descriptor, performs one unary exchange, and renders the typed response
//! back to JSON text. Nothing here knows message shapes at compile time.

use super::codec::MarshalOptions;
use super::context::CallContext;
use super::headers::HeaderSet;
use super::status::describe;
use super::transport::{UnaryCall, UnaryTransport, WireProtocol};
use crate::error::{BridgeError, Result};
use crate::mcp::types::ToolResult;
use async_trait::async_trait;
use prost_reflect::{DynamicMessage, MethodDescriptor, ReflectMessage};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tonic::Status;
use tracing::{debug, warn};

/// Handler bound to a tool definition
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run one invocation. Failures are returned as error-flagged results.
    async fn call(&self, context: CallContext) -> ToolResult;
}

/// Collaborators shared by every handler produced during projection
#[derive(Clone)]
pub struct EngineBinding {
    transport: Arc<dyn UnaryTransport>,
    headers: Arc<HeaderSet>,
    options: MarshalOptions,
    timeout: Option<Duration>,
}

impl EngineBinding {
    /// Bind a transport and the configured base headers
    pub fn new(transport: Arc<dyn UnaryTransport>, headers: HeaderSet) -> Self {
        Self {
            transport,
            headers: Arc::new(headers),
            options: MarshalOptions::default(),
            timeout: None,
        }
    }

    /// Bound every call by a deadline
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the JSON marshalling options
    pub fn with_options(mut self, options: MarshalOptions) -> Self {
        self.options = options;
        self
    }

    /// Protocol of the bound transport
    pub fn protocol(&self) -> WireProtocol {
        self.transport.protocol()
    }

    /// Create the handler for one method
    pub fn bind(&self, method: MethodDescriptor) -> DynamicInvoker {
        DynamicInvoker {
            method,
            transport: Arc::clone(&self.transport),
            headers: Arc::clone(&self.headers),
            options: self.options,
            timeout: self.timeout,
        }
    }
}

impl fmt::Debug for EngineBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBinding")
            .field("protocol", &self.transport.protocol())
            .field("headers", &self.headers.len())
            .field("options", &self.options)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Handler that calls one backend method with runtime-typed messages
#[derive(Clone)]
pub struct DynamicInvoker {
    method: MethodDescriptor,
    transport: Arc<dyn UnaryTransport>,
    headers: Arc<HeaderSet>,
    options: MarshalOptions,
    timeout: Option<Duration>,
}

impl DynamicInvoker {
    /// Method this handler calls
    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    /// Decode arguments into a fresh request of the method's input type
    pub fn build_request(&self, arguments: &Value) -> Result<DynamicMessage> {
        self.options.decode_value(&self.method.input(), arguments)
    }

    /// Render a response of the method's output type as JSON text
    pub fn render_response(&self, response: &DynamicMessage) -> Result<String> {
        if response.descriptor() != self.method.output() {
            return Err(BridgeError::invocation(format!(
                "expected {} response, got {}",
                self.method.output().full_name(),
                response.descriptor().full_name()
            )));
        }
        self.options.encode_json(response)
    }

    /// Build the outbound call: typed request plus merged headers
    pub fn prepare(&self, context: &CallContext) -> Result<UnaryCall> {
        Ok(UnaryCall {
            method: self.method.clone(),
            request: self.build_request(&context.arguments)?,
            headers: self.headers.merge(&context.headers),
            timeout: self.timeout,
        })
    }

    /// Run the invocation, returning the response JSON text
    pub async fn invoke(&self, context: CallContext) -> Result<String> {
        let call = self.prepare(&context)?;
        debug!(
            "Calling {} over {} with {} header(s)",
            self.method.full_name(),
            self.transport.protocol(),
            call.headers.len()
        );

        let exchange = async {
            match self.timeout {
                Some(timeout) => tokio::time::timeout(timeout, self.transport.unary(call))
                    .await
                    .unwrap_or_else(|_| {
                        Err(Status::deadline_exceeded(format!(
                            "no response within {}ms",
                            timeout.as_millis()
                        )))
                    }),
                None => self.transport.unary(call).await,
            }
        };

        let response = tokio::select! {
            biased;
            _ = context.cancel.cancelled() => Err(Status::cancelled("call cancelled by client")),
            outcome = exchange => outcome,
        }?;

        self.render_response(&response)
    }
}

/// Tool error text for a failed invocation
pub fn failure_message(error: &BridgeError) -> String {
    match error {
        BridgeError::Status(status) => describe(status),
        BridgeError::Invocation { message } => message.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ToolHandler for DynamicInvoker {
    async fn call(&self, context: CallContext) -> ToolResult {
        match self.invoke(context).await {
            Ok(text) => ToolResult::text(text),
            Err(error) => {
                let message = failure_message(&error);
                warn!("{} failed ({}): {}", self.method.full_name(), error.category(), message);
                ToolResult::error(message)
            }
        }
    }
}

impl fmt::Debug for DynamicInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicInvoker")
            .field("method", &self.method.full_name())
            .field("protocol", &self.transport.protocol())
            .field("timeout", &self.timeout)
            .finish()
    }
}
