//! Error types and handling for the bridge

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A file names a dependency that is not part of the collected set
    #[error("Descriptor '{file}' depends on '{dependency}', which was not found")]
    MissingDependency { file: String, dependency: String },

    /// The dependency graph contains a cycle
    #[error("Descriptor dependency cycle: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    /// Server reflection errors
    #[error("Discovery error: {message}")]
    Discovery { message: String },

    /// Per-call invocation errors (argument decoding, response encoding)
    #[error("Invocation error: {message}")]
    Invocation { message: String },

    /// Transport construction errors
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Protobuf wire decoding errors
    #[error("Protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Descriptor pool linking errors
    #[error("Descriptor pool error: {0}")]
    Pool(#[from] prost_reflect::DescriptorError),

    /// gRPC status returned by a backend
    #[error("gRPC status {}: {}", .0.code(), .0.message())]
    Status(#[from] tonic::Status),
}

impl BridgeError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing dependency error
    pub fn missing_dependency<F: Into<String>, D: Into<String>>(file: F, dependency: D) -> Self {
        Self::MissingDependency {
            file: file.into(),
            dependency: dependency.into(),
        }
    }

    /// Create a discovery error
    pub fn discovery<S: Into<String>>(message: S) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    /// Create an invocation error
    pub fn invocation<S: Into<String>>(message: S) -> Self {
        Self::Invocation {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            BridgeError::Config { .. } => "config",
            BridgeError::MissingDependency { .. } => "missing_dependency",
            BridgeError::DependencyCycle { .. } => "dependency_cycle",
            BridgeError::Discovery { .. } => "discovery",
            BridgeError::Invocation { .. } => "invocation",
            BridgeError::Transport { .. } => "transport",
            BridgeError::Io(_) => "io",
            BridgeError::Serde(_) => "serialization",
            BridgeError::Decode(_) => "protobuf_decode",
            BridgeError::Pool(_) => "descriptor_pool",
            BridgeError::Status(_) => "grpc_status",
        }
    }
}
