//! Line-based TCP Chat Server - Entry Point
//!
//! Resolves configuration, starts the listener and serves until ctrl-c.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_relay::{ChatServer, ProtocolVariant, ServerConfig};

/// Line-based TCP chat server
#[derive(Parser, Debug)]
#[command(name = "chat_relay", version, about, long_about = None)]
struct Cli {
    /// TOML config file; flags below override its values
    #[arg(long, env = "CHAT_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Force sessions offline after this many milliseconds without activity
    #[arg(long)]
    idle_timeout_ms: Option<u64>,

    /// Command syntax for rename and private messages
    #[arg(long, value_enum)]
    protocol: Option<ProtocolVariant>,
}

impl Cli {
    fn resolve_config(&self) -> Result<ServerConfig, chat_relay::ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(ms) = self.idle_timeout_ms {
            config.idle_timeout_ms = ms;
        }
        if let Some(protocol) = self.protocol {
            config.protocol = protocol;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    info!(
        "Idle timeout {:?}, max line {} bytes, {:?} protocol",
        config.idle_timeout(),
        config.max_line_length,
        config.protocol
    );

    let server = ChatServer::bind(config).await?;
    info!("Chat server listening on {}", server.local_addr()?);

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
