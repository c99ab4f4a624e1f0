//! Newline-delimited JSON-RPC over stdin/stdout

use super::errors::McpError;
use super::server::McpServer;
use crate::error::Result;
use futures_util::FutureExt;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Serve on the process's stdin and stdout until stdin closes
pub async fn run_stdio(server: Arc<McpServer>) -> Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    serve_lines(server, reader, tokio::io::stdout()).await
}

/// Serve JSON-RPC messages read line by line from `reader`, writing responses to `writer`.
/// Each message is handled on its own task so a slow call does not block others.
pub async fn serve_lines<R, W>(server: Arc<McpServer>, mut reader: R, writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(Mutex::new(writer));
    let mut tasks = JoinSet::new();
    let mut buffer = Vec::new();

    info!("MCP stdio mode ready - waiting for JSON-RPC messages");

    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer).await? == 0 {
            info!("stdin closed, shutting down stdio mode");
            break;
        }

        let server = Arc::clone(&server);
        let writer = Arc::clone(&writer);
        match String::from_utf8(std::mem::take(&mut buffer)) {
            Ok(line) => {
                let message = line.trim().to_string();
                if message.is_empty() {
                    continue;
                }
                tasks.spawn(async move {
                    let Some(response) = server.handle_message(&message).await else {
                        return;
                    };
                    respond(&writer, &response).await;
                });
            }
            Err(e) => {
                warn!("Discarding stdin line that is not UTF-8: {}", e);
                let response = McpServer::create_error_response(
                    None,
                    McpError::parse_error(format!("Message is not valid UTF-8: {}", e)),
                );
                tasks.spawn(async move { respond(&writer, &response).await });
            }
        }

        // Reap finished tasks so the set does not grow with the session.
        while let Some(Some(_)) = tasks.join_next().now_or_never() {}
    }

    debug!("Draining {} outstanding request(s)", tasks.len());
    while tasks.join_next().await.is_some() {}
    Ok(())
}

async fn respond<W: AsyncWrite + Unpin>(writer: &Mutex<W>, response: &str) {
    let mut guard = writer.lock().await;
    if let Err(e) = write_line(&mut *guard, response).await {
        error!("Failed to write response to stdout: {}", e);
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> std::io::Result<()> {
    writer.write_all(text.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
