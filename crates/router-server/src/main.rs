//! `router-server` binary: CLI entrypoint, logging init, and transport
//! dispatch for the MCP aggregating proxy (SPEC_FULL.md §10.5).

mod handler;
mod wiring;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use handler::RouterServerHandler;
use rmcp::ServiceExt;
use router_config::RouterConfig;
use tracing_subscriber::EnvFilter;

/// MCP aggregating proxy: a single `query` tool backed by a planning,
/// validation, and execution engine over local and upstream tools.
#[derive(Parser)]
#[command(name = "router-server")]
#[command(about = "MCP aggregating proxy")]
#[command(version)]
struct Cli {
    /// Serve over stdin/stdout (default transport).
    #[arg(long)]
    stdio: bool,

    /// Serve Streamable HTTP on this address instead of stdio.
    #[arg(long)]
    http_bind: Option<String>,

    /// Port for --http-bind (default 8765).
    #[arg(long, default_value_t = 8765)]
    http_port: u16,

    /// Enable the dev-mode scaffolding-marker tool (overrides ROUTER_DEV_MODE).
    #[arg(long)]
    dev_mode: bool,

    /// Raise the default log level to debug.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)))
        .with_writer(std::io::stderr)
        .init();

    if cli.stdio && cli.http_bind.is_some() {
        anyhow::bail!("--stdio and --http-bind are mutually exclusive");
    }

    let mut config = RouterConfig::load().context("failed to load router configuration")?;
    if cli.dev_mode {
        config.dev_mode = true;
    }

    let wiring::Wired { entrypoint, upstream } = wiring::build(config)?;
    let handler = RouterServerHandler::new(entrypoint);

    if let Some(bind) = cli.http_bind.as_deref() {
        serve_http(handler, bind, cli.http_port).await?;
    } else {
        serve_stdio(handler).await?;
    }

    upstream.shutdown_all().await;
    Ok(())
}

async fn serve_stdio(handler: RouterServerHandler) -> anyhow::Result<()> {
    tracing::info!("starting router-server on stdio");
    let service = handler.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;
    Ok(())
}

async fn serve_http(handler: RouterServerHandler, bind: &str, port: u16) -> anyhow::Result<()> {
    use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
    use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};

    let addr: SocketAddr = format!("{bind}:{port}").parse().context("invalid --http-bind/--http-port")?;
    tracing::info!(%addr, "starting router-server on streamable HTTP");

    let config = StreamableHttpServerConfig {
        sse_keep_alive: Some(std::time::Duration::from_secs(15)),
        stateful_mode: true,
        cancellation_token: tokio_util::sync::CancellationToken::new(),
    };
    let session_manager = Arc::new(LocalSessionManager::default());
    let service_factory = move || Ok(handler.clone());
    let mcp_service = StreamableHttpService::new(service_factory, session_manager, config);

    let router = axum::Router::new().nest_service("/", mcp_service);
    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind HTTP listener")?;
    axum::serve(listener, router).await.context("HTTP server failed")?;
    Ok(())
}
