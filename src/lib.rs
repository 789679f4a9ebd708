//! Line-based TCP Chat Server Library
//!
//! Clients connect over TCP, join one shared room, and exchange public
//! and private messages through a small newline-delimited text protocol.
//!
//! # Features
//! - Online/offline announcements and a welcome with the participant count
//! - `who` / `num` queries
//! - Renaming with uniqueness enforced atomically
//! - Private messages (`to-<name>`)
//! - Idle timeout that forces silent sessions offline
//!
//! # Architecture
//! - `Registry` is the shared name → session table. One lock serializes
//!   registration, renames, removal and broadcast fan-out.
//! - Each connection has a `handler` that spawns a read task (input →
//!   `Session::interpret`) and a write task (mailbox → socket), then
//!   supervises liveness with `select!`.
//! - Mailboxes are unbounded, so a slow client never stalls a broadcast.
//!
//! # Example
//! ```ignore
//! use chat_relay::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = ChatServer::bind(ServerConfig::default()).await.unwrap();
//!     server.run(async { tokio::signal::ctrl_c().await.ok(); }).await;
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod mailbox;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use codec::{InputLine, LineCodec};
pub use config::{ProtocolVariant, ServerConfig};
pub use error::{AppError, CommandError, ConfigError, RegistryError, SendError};
pub use handler::{handle_connection, serve_connection};
pub use mailbox::{Mailbox, MailboxReceiver};
pub use message::{Broadcast, Notice, Origin};
pub use registry::Registry;
pub use server::ChatServer;
pub use session::{Command, OfflineReason, Outcome, Session};
pub use types::SessionId;
