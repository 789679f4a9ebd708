//! ChatServer implementation
//!
//! Binds the listener, owns the registry, and spawns one handler task
//! per accepted connection. A failing connection is logged and never
//! stops the accept loop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::message::Broadcast;
use crate::registry::Registry;

/// Notice broadcast when the accept loop stops
pub const SHUTDOWN_NOTICE: &str = "Server is shutting down.";

/// The chat server: a listener plus the registry shared by its sessions
pub struct ChatServer {
    listener: TcpListener,
    registry: Registry,
    config: Arc<ServerConfig>,
}

impl ChatServer {
    /// Bind to `config.bind` with a fresh registry
    pub async fn bind(config: ServerConfig) -> Result<Self, AppError> {
        let listener = TcpListener::bind(config.bind).await?;
        Ok(Self {
            listener,
            registry: Registry::new(),
            config: Arc::new(config),
        })
    }

    /// Actual bound address (useful when binding port 0)
    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to the shared registry
    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!("ChatServer listening on {:?}", self.listener.local_addr().ok());
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("New connection from {}", addr);
                        let registry = self.registry.clone();
                        let config = Arc::clone(&self.config);

                        // Spawn handler task for each connection
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, registry, config).await {
                                error!("Connection handler error for {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
                _ = &mut shutdown => break,
            }
        }

        let notified = self.registry.broadcast(&Broadcast::server(SHUTDOWN_NOTICE));
        info!("ChatServer shutting down, notified {} session(s)", notified);
    }
}
