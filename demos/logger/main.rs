//! Log-everything RESP server.
//!
//! Accepts connections on the configured port and prints every lifecycle
//! and data notification the core emits. Useful for watching what a Redis
//! client actually puts on the wire:
//!
//! ```text
//! cargo run --example logger -- --port 6379
//! redis-cli -p 6379 set greeting hello
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use resp_core::{
    ConnectionEvent, DataEvent, DisconnectEvent, ErrorEvent, EventHandler, HandlerResult,
    RespServer, ServerConfig,
};

#[derive(Parser)]
#[command(about = "RESP server that logs every parsed frame")]
struct Args {
    /// TOML config file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listening port.
    #[arg(long)]
    port: Option<u16>,
}

struct LogEverything;

#[async_trait]
impl EventHandler for LogEverything {
    async fn connected(&self, event: &ConnectionEvent) {
        info!(connection = %event.connection, addr = %event.remote_addr, "connected");
    }

    async fn disconnected(&self, event: &DisconnectEvent) {
        info!(connection = %event.connection, reason = %event.reason, "disconnected");
    }

    async fn error(&self, event: &ErrorEvent) {
        error!(connection = ?event.connection, cause = ?event.cause, "error");
    }

    async fn data(&self, event: &DataEvent) -> HandlerResult {
        info!(
            connection = %event.connection,
            kind = event.frame.value.kind().name(),
            dialect = ?event.dialect,
            bytes = event.frame.consumed(),
            value = ?event.frame.value,
            "frame"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_path(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }

    let server = RespServer::new(config, Arc::new(LogEverything));
    server.start().await?;
    info!(addrs = ?server.local_addrs().await, "serving; press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    server.stop().await;
    Ok(())
}
