//! HTTP host: SSE transport plus a plain JSON-RPC endpoint
//!
//! `GET /sse` opens an event stream whose first event names the endpoint the
//! client posts messages to. Responses to those posts travel back over the
//! stream. `POST /mcp` answers in the HTTP response body instead.

use super::server::McpServer;
use crate::error::Result;
use actix_web::http::header;
use actix_web::middleware::Logger;
use actix_web::web::{self, Bytes};
use actix_web::{App, HttpResponse, HttpServer};
use futures_util::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

type SessionTable = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Bytes>>>>;

/// State shared by every HTTP worker
#[derive(Clone)]
pub struct HttpState {
    server: Arc<McpServer>,
    sessions: SessionTable,
}

impl HttpState {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self {
            server,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of open SSE sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// Register the bridge routes on an actix app
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/sse", web::get().to(sse_handler))
        .route("/message", web::post().to(message_handler))
        .route("/mcp", web::post().to(mcp_jsonrpc_handler));
}

/// Serve over HTTP on `hostport` until the server stops
pub async fn run_http(server: Arc<McpServer>, hostport: &str) -> Result<()> {
    let state = web::Data::new(HttpState::new(server));
    info!("MCP HTTP host listening on {} (SSE at /sse, JSON-RPC at /mcp)", hostport);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(configure)
    })
    .bind(hostport)?
    .run()
    .await?;

    Ok(())
}

fn sse_event(event: &str, data: &str) -> Bytes {
    Bytes::from(format!("event: {}\ndata: {}\n\n", event, data))
}

/// Health check endpoint
pub async fn health_check(state: web::Data<HttpState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": state.server.info().name,
        "tools": state.server.tool_count(),
    }))
}

/// Open an SSE session
pub async fn sse_handler(state: web::Data<HttpState>) -> HttpResponse {
    let session_id = Uuid::new_v4().to_string();
    let (sender, receiver) = mpsc::unbounded_channel();

    let endpoint = format!("/message?sessionId={}", session_id);
    // The receiver is alive, so the first send cannot fail.
    let _ = sender.send(sse_event("endpoint", &endpoint));
    state.sessions.write().await.insert(session_id.clone(), sender);
    info!("SSE session {} opened", session_id);

    // The guard lives as long as the response body, so a client that goes
    // away takes its session with it.
    let guard = SessionGuard {
        session_id,
        sessions: Arc::clone(&state.sessions),
    };
    let stream = UnboundedReceiverStream::new(receiver).map(move |event| {
        let _ = &guard;
        Ok::<Bytes, actix_web::Error>(event)
    });
    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::CONNECTION, "keep-alive"))
        .streaming(stream)
}

/// Removes an SSE session from the table when its stream is dropped
struct SessionGuard {
    session_id: String,
    sessions: SessionTable,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.sessions.try_write() {
            sessions.remove(&self.session_id);
            info!("SSE session {} closed", self.session_id);
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let sessions = Arc::clone(&self.sessions);
            let session_id = std::mem::take(&mut self.session_id);
            handle.spawn(async move {
                sessions.write().await.remove(&session_id);
                info!("SSE session {} closed", session_id);
            });
        }
    }
}

/// Accept a message for an SSE session; the response is delivered on the stream
pub async fn message_handler(
    state: web::Data<HttpState>,
    query: web::Query<SessionQuery>,
    body: String,
) -> HttpResponse {
    let session_id = query.into_inner().session_id;
    let Some(sender) = state.sessions.read().await.get(&session_id).cloned() else {
        return HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("unknown session '{}'", session_id)
        }));
    };

    let server = Arc::clone(&state.server);
    let sessions = Arc::clone(&state.sessions);
    tokio::spawn(async move {
        let Some(response) = server.handle_message(&body).await else {
            return;
        };
        if sender.send(sse_event("message", &response)).is_err() {
            debug!("SSE session {} closed, dropping it", session_id);
            sessions.write().await.remove(&session_id);
        }
    });

    HttpResponse::Accepted().finish()
}

/// Plain JSON-RPC request/response endpoint
pub async fn mcp_jsonrpc_handler(state: web::Data<HttpState>, body: String) -> HttpResponse {
    match state.server.handle_message(&body).await {
        Some(response) => HttpResponse::Ok()
            .content_type("application/json")
            .body(response),
        None => HttpResponse::Accepted().finish(),
    }
}

impl std::fmt::Debug for HttpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpState").field("server", &self.server).finish()
    }
}
