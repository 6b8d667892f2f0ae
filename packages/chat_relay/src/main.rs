use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use chat_relay::ai::AiClient;
use chat_relay::auth::StaticTokenValidator;
use chat_relay::config::{
    AiConfig, AuthConfig, FileConfig, ServerConfig, StreamConfig, load_config,
};
use chat_relay::dispatch::Dispatcher;
use chat_relay::metrics::ServerMetrics;
use chat_relay::registry::ConnectionRegistry;
use chat_relay::store::StreamStore;
use chat_relay::{AppState, app};

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "WebSocket relay for streamed AI chat responses")]
struct Cli {
    /// Directory containing config.toml (defaults to cwd)
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "chat_relay=debug,tower_http=debug,info"
    } else {
        "chat_relay=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting chat relay");

    let mut file_config: FileConfig = load_config(&cli.config_dir)
        .extract()
        .context("Failed to load configuration")?;
    if let Some(host) = cli.host {
        file_config.server.host = host;
    }
    if let Some(port) = cli.port {
        file_config.server.port = port;
    }

    let server_config = Arc::new(ServerConfig::from_file(&file_config.server));
    let auth_config = AuthConfig::from_file(&file_config.auth);
    let ai_config = AiConfig::from_file(&file_config.ai);
    let stream_config = StreamConfig::from_file(&file_config.stream);

    if !auth_config.enabled {
        warn!("Authentication is disabled - all connections will be accepted");
    }

    let registry = Arc::new(ConnectionRegistry::new());
    let store = Arc::new(StreamStore::new());
    let metrics = Arc::new(ServerMetrics::new());
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        store.clone(),
        metrics.clone(),
    ));
    let ai = Arc::new(AiClient::new(&ai_config).context("Failed to build AI client")?);

    let state = AppState {
        registry,
        store: store.clone(),
        dispatcher: dispatcher.clone(),
        ai,
        validator: Arc::new(StaticTokenValidator::new(&auth_config)),
        server_config: server_config.clone(),
        metrics,
    };

    // Periodic sweep: purge retained terminal messages and error out stuck
    // ones, publishing the error frame to anyone still attached.
    let shutdown = CancellationToken::new();
    let sweeper_shutdown = shutdown.clone();
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(stream_config.sweep_interval);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = sweeper_shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            let timed_out = store
                .sweep(stream_config.retention, stream_config.pending_timeout)
                .await;
            for message_id in timed_out {
                dispatcher.publish(message_id).await;
            }
        }
    });

    let addr = format!("{}:{}", server_config.host, server_config.port)
        .parse::<SocketAddr>()
        .context("Invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let actual_addr = listener.local_addr()?;

    info!("Chat relay listening on http://{}", actual_addr);
    info!("  GET  /ws/chat/:chat_id                               - Chat WebSocket");
    info!("  POST /api/chats/:chat_id/messages                    - Submit a message");
    info!("  POST /api/chats/:chat_id/messages/:message_id/callback - AI callback");

    let shutdown_signal = {
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
            }
            info!("Received shutdown signal, cleaning up...");
            shutdown.cancel();
        }
    };

    let server_result = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    sweeper.abort();
    info!("Shutdown complete");
    server_result
}
