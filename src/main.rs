use anyhow::{Context, Result};
use clap::Parser;
use grpcmcp::config::{parse_service_list, BridgeConfig};
use grpcmcp::invocation::WireProtocol;
use grpcmcp::mcp::{run_http, run_stdio};
use grpcmcp::startup::build_server;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
struct Cli {
    /// YAML configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serialized FileDescriptorSet bundle
    #[arg(long)]
    descriptors: Option<String>,

    /// Discover services through gRPC server reflection
    #[arg(long)]
    reflect: bool,

    /// Comma-separated fully-qualified services to expose (default: all)
    #[arg(long)]
    services: Option<String>,

    /// Header sent with every call, "Name: Value" (repeatable)
    #[arg(long = "header")]
    headers: Vec<String>,

    /// Bearer token for the Authorization header
    #[arg(long)]
    bearer: Option<String>,

    /// Environment variable holding the bearer token (overrides --bearer)
    #[arg(long)]
    bearer_env: Option<String>,

    /// Backend base URL
    #[arg(long)]
    url: Option<String>,

    /// Use the Connect protocol instead of gRPC
    #[arg(long)]
    connect: bool,

    /// MCP server name
    #[arg(long)]
    name: Option<String>,

    /// MCP server version
    #[arg(long = "version")]
    server_version: Option<String>,

    /// Serve HTTP/SSE on host:port instead of stdio
    #[arg(long)]
    hostport: Option<String>,

    /// Per-call timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error) when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Layer flags over a base configuration
    fn apply(self, mut config: BridgeConfig) -> BridgeConfig {
        if let Some(descriptors) = self.descriptors {
            config.descriptors = Some(descriptors);
        }
        if self.reflect {
            config.reflect = true;
        }
        if let Some(services) = self.services {
            config.services = parse_service_list(&services);
        }
        if !self.headers.is_empty() {
            config.headers = self.headers;
        }
        if let Some(bearer) = self.bearer {
            config.bearer = Some(bearer);
        }
        if let Some(bearer_env) = self.bearer_env {
            config.bearer_env = Some(bearer_env);
        }
        if let Some(url) = self.url {
            config.url = url;
        }
        if self.connect {
            config.protocol = WireProtocol::Connect;
        }
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(version) = self.server_version {
            config.version = version;
        }
        if let Some(hostport) = self.hostport {
            config.hostport = Some(hostport);
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = Some(timeout);
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_file = BridgeConfig::load_env_file();
    let cli = Cli::parse();

    let base = match &cli.config {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    let config = cli.apply(base);

    init_logging(&config.log_level)?;
    env_file.log();

    let server = build_server(&config).await.map_err(|e| {
        error!("Startup failed ({}): {}", e.category(), e);
        e
    })?;
    let server = Arc::new(server);

    match &config.hostport {
        Some(hostport) => run_http(server, hostport).await?,
        None => run_stdio(server).await?,
    }

    info!("Shut down cleanly");
    Ok(())
}

/// Initialize tracing. Logs go to stderr; stdout carries the stdio protocol.
fn init_logging(level: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}
