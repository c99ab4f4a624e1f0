//! Per-call machinery: argument decoding, header merging, backend transports,
//! and the handler bound to every projected tool.

pub mod codec;
pub mod context;
pub mod engine;
pub mod headers;
pub mod status;
pub mod transport;

pub use codec::{DynamicCodec, MarshalOptions};
pub use context::{CallContext, CancelHandle, CancelSignal};
pub use engine::{failure_message, DynamicInvoker, EngineBinding, ToolHandler};
pub use headers::HeaderSet;
pub use transport::{
    build_channel, parse_backend_url, procedure_path, transport_for, ConnectTransport,
    GrpcTransport, UnaryCall, UnaryTransport, WireProtocol,
};
