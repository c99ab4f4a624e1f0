//! Dynamic invocation engine tests

mod common;

use common::{binding, greeter_registry, EchoTransport, FailingTransport, HangingTransport};
use grpcmcp::invocation::{CallContext, CancelSignal, EngineBinding, HeaderSet, ToolHandler};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tonic::Status;

fn say_hello() -> prost_reflect::MethodDescriptor {
    greeter_registry(false)
        .find_method("pkg.Greeter", "SayHello")
        .expect("SayHello is registered")
}

#[tokio::test]
async fn test_echo_call_returns_exact_json() {
    let invoker = binding(Arc::new(EchoTransport::default())).bind(say_hello());
    let result = invoker.call(CallContext::new(json!({ "name": "Ada" }))).await;

    assert!(!result.is_error);
    assert_eq!(result.first_text(), Some(r#"{"greeting":"Hello, Ada"}"#));
}

#[tokio::test]
async fn test_unknown_fields_are_dropped() {
    let invoker = binding(Arc::new(EchoTransport::default())).bind(say_hello());

    let request = invoker
        .build_request(&json!({ "name": "Ada", "shoe_size": 44 }))
        .unwrap();
    let options = grpcmcp::invocation::MarshalOptions::default();
    assert_eq!(options.encode_json(&request).unwrap(), r#"{"name":"Ada"}"#);

    let result = invoker
        .call(CallContext::new(json!({ "name": "Ada", "shoe_size": 44 })))
        .await;
    assert_eq!(result.first_text(), Some(r#"{"greeting":"Hello, Ada"}"#));
}

#[tokio::test]
async fn test_missing_arguments_decode_as_empty() {
    let invoker = binding(Arc::new(EchoTransport::default())).bind(say_hello());
    let result = invoker.call(CallContext::new(serde_json::Value::Null)).await;

    assert!(!result.is_error);
    assert_eq!(result.first_text(), Some(r#"{"greeting":"Hello, "}"#));
}

#[tokio::test]
async fn test_malformed_arguments_are_an_error_result() {
    let invoker = binding(Arc::new(EchoTransport::default())).bind(say_hello());
    let result = invoker.call(CallContext::new(json!({ "name": 42 }))).await;

    assert!(result.is_error);
    assert!(result.first_text().unwrap().contains("pkg.HelloRequest"));
}

#[tokio::test]
async fn test_backend_failure_is_code_and_message() {
    let transport = FailingTransport(Status::unavailable("connection refused"));
    let invoker = binding(Arc::new(transport)).bind(say_hello());
    let result = invoker.call(CallContext::new(json!({ "name": "Ada" }))).await;

    assert!(result.is_error);
    assert_eq!(result.first_text(), Some("unavailable: connection refused"));
}

#[tokio::test]
async fn test_header_override_replaces_base_value() {
    let transport = Arc::new(EchoTransport::default());
    let mut base = HeaderSet::new();
    base.add("X-A", "1").unwrap();
    base.add("X-Keep", "yes").unwrap();
    let invoker = EngineBinding::new(transport.clone(), base).bind(say_hello());

    let mut overrides = HeaderSet::new();
    overrides.add("X-A", "2").unwrap();
    let context = CallContext::new(json!({ "name": "Ada" })).with_headers(overrides);
    let result = invoker.call(context).await;
    assert!(!result.is_error);

    let seen = transport.seen_headers.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].get_all("x-a"), vec!["2"]);
    assert_eq!(seen[0].get_all("x-keep"), vec!["yes"]);
}

#[tokio::test]
async fn test_cancellation_abandons_the_call() {
    let invoker = binding(Arc::new(HangingTransport)).bind(say_hello());
    let (handle, signal) = CancelSignal::pair();

    let call = tokio::spawn(async move {
        invoker
            .call(CallContext::new(json!({ "name": "Ada" })).with_cancel(signal))
            .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel();

    let result = tokio::time::timeout(Duration::from_secs(2), call)
        .await
        .expect("call should finish after cancellation")
        .unwrap();
    assert!(result.is_error);
    assert!(result.first_text().unwrap().starts_with("canceled:"));
}

#[tokio::test]
async fn test_timeout_gives_deadline_exceeded() {
    let invoker = binding(Arc::new(HangingTransport))
        .with_timeout(Some(Duration::from_millis(50)))
        .bind(say_hello());
    let result = invoker.call(CallContext::new(json!({ "name": "Ada" }))).await;

    assert!(result.is_error);
    assert!(result.first_text().unwrap().starts_with("deadline_exceeded:"));
}

#[tokio::test]
async fn test_concurrent_calls_do_not_share_messages() {
    let invoker = Arc::new(binding(Arc::new(EchoTransport::default())).bind(say_hello()));
    let mut handles = Vec::new();
    for i in 0..16 {
        let invoker = Arc::clone(&invoker);
        handles.push(tokio::spawn(async move {
            let name = format!("caller-{}", i);
            let result = invoker.call(CallContext::new(json!({ "name": name }))).await;
            (name, result)
        }));
    }
    for handle in handles {
        let (name, result) = handle.await.unwrap();
        assert_eq!(
            result.first_text().unwrap(),
            format!(r#"{{"greeting":"Hello, {}"}}"#, name)
        );
    }
}

#[test]
fn test_render_response_checks_message_type() {
    let invoker = binding(Arc::new(EchoTransport::default())).bind(say_hello());

    let request = invoker.build_request(&json!({ "name": "Ada" })).unwrap();
    let err = invoker.render_response(&request).unwrap_err();
    assert!(err
        .to_string()
        .contains("expected pkg.HelloReply response, got pkg.HelloRequest"));

    let mut reply = prost_reflect::DynamicMessage::new(invoker.method().output());
    reply.set_field_by_name(
        "greeting",
        prost_reflect::Value::String("Hello, Ada".to_string()),
    );
    assert_eq!(
        invoker.render_response(&reply).unwrap(),
        r#"{"greeting":"Hello, Ada"}"#
    );
}
