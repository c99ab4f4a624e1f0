//! Descriptor-typed codecs
//!
//! `MarshalOptions` carries the JSON mapping settings used everywhere a
//! dynamic message crosses into or out of JSON. `DynamicCodec` is the tonic
//! codec used for unary calls; its decoder is constructed with the method's
//! output descriptor so responses are typed without generated code.

use crate::error::{BridgeError, Result};
use prost::Message;
use prost_reflect::{
    DeserializeOptions, DynamicMessage, MessageDescriptor, ReflectMessage, SerializeOptions,
};
use serde_json::Value;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

/// JSON marshalling settings for dynamic messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarshalOptions {
    /// Emit `snake_case` proto field names instead of lowerCamel JSON names
    pub use_proto_names: bool,
    /// Drop input fields the message does not declare instead of failing
    pub discard_unknown: bool,
    /// Emit fields holding their default value
    pub emit_defaults: bool,
}

impl Default for MarshalOptions {
    fn default() -> Self {
        Self {
            use_proto_names: true,
            discard_unknown: true,
            emit_defaults: false,
        }
    }
}

impl MarshalOptions {
    fn serialize_options(&self) -> SerializeOptions {
        SerializeOptions::new()
            .use_proto_field_name(self.use_proto_names)
            .skip_default_fields(!self.emit_defaults)
    }

    fn deserialize_options(&self) -> DeserializeOptions {
        DeserializeOptions::new().deny_unknown_fields(!self.discard_unknown)
    }

    /// Decode JSON text into a fresh message of the given type
    pub fn decode_json(&self, descriptor: &MessageDescriptor, text: &str) -> Result<DynamicMessage> {
        let mut deserializer = serde_json::Deserializer::from_str(text);
        let message = DynamicMessage::deserialize_with_options(
            descriptor.clone(),
            &mut deserializer,
            &self.deserialize_options(),
        )
        .map_err(|e| {
            BridgeError::invocation(format!("invalid {} input: {}", descriptor.full_name(), e))
        })?;
        deserializer.end().map_err(|e| {
            BridgeError::invocation(format!("invalid {} input: {}", descriptor.full_name(), e))
        })?;
        Ok(message)
    }

    /// Decode structured arguments into a fresh message of the given type.
    /// The arguments are rendered to JSON text first; null means an empty message.
    pub fn decode_value(&self, descriptor: &MessageDescriptor, arguments: &Value) -> Result<DynamicMessage> {
        if arguments.is_null() {
            return Ok(DynamicMessage::new(descriptor.clone()));
        }
        let text = serde_json::to_string(arguments)?;
        self.decode_json(descriptor, &text)
    }

    /// Encode a message as compact JSON text
    pub fn encode_json(&self, message: &DynamicMessage) -> Result<String> {
        let mut buffer = Vec::new();
        let mut serializer = serde_json::Serializer::new(&mut buffer);
        message
            .serialize_with_options(&mut serializer, &self.serialize_options())
            .map_err(|e| {
                BridgeError::invocation(format!(
                    "failed to encode {} as JSON: {}",
                    message.descriptor().full_name(),
                    e
                ))
            })?;
        String::from_utf8(buffer)
            .map_err(|e| BridgeError::invocation(format!("response is not UTF-8: {}", e)))
    }
}

/// tonic codec for dynamic request and response messages
#[derive(Debug, Clone)]
pub struct DynamicCodec {
    response: MessageDescriptor,
}

impl DynamicCodec {
    /// Create a codec decoding responses as `response`
    pub fn new(response: MessageDescriptor) -> Self {
        Self { response }
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;
    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder {
            descriptor: self.response.clone(),
        }
    }
}

/// Encodes dynamic messages to protobuf bytes
#[derive(Debug, Clone, Default)]
pub struct DynamicEncoder;

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> std::result::Result<(), Self::Error> {
        item.encode(dst)
            .map_err(|e| Status::internal(format!("failed to encode request: {}", e)))
    }
}

/// Decodes protobuf bytes into messages of a fixed type
#[derive(Debug, Clone)]
pub struct DynamicDecoder {
    descriptor: MessageDescriptor,
}

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> std::result::Result<Option<Self::Item>, Self::Error> {
        DynamicMessage::decode(self.descriptor.clone(), src)
            .map(Some)
            .map_err(|e| {
                Status::internal(format!(
                    "failed to decode {} response: {}",
                    self.descriptor.full_name(),
                    e
                ))
            })
    }
}
