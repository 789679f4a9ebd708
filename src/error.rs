//! Error types for the chat server
//!
//! Defines connection-level errors, registry rejections, client-visible
//! command errors and mailbox send errors.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::SessionId;

/// Application-level errors
///
/// These end a single connection (or stop startup); they are never
/// fatal to other sessions.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal for the connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Registry rejected the session
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A session that went offline cannot be registered again
    #[error("Session {0} is already offline")]
    SessionOffline(SessionId),

    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Registry rejections
///
/// Always recovered locally by refusing the single operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Another session already holds the name
    #[error("name '{0}' is already taken")]
    NameTaken(String),

    /// Rename target equals the current name
    #[error("new name must differ from the current name")]
    SameName,

    /// No session is registered under the name
    #[error("no user named '{0}' is online")]
    NotFound(String),
}

/// Client-visible validation errors
///
/// The `Display` text is sent to the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Line contained nothing but the terminator
    #[error("Input must not be empty, please try again.")]
    EmptyInput,

    /// Line exceeded the configured maximum
    #[error("Input is longer than {max} bytes, please try again.")]
    InputTooLong { max: usize },

    /// Rename to the name already held
    #[error("New name must differ from your current name, please try again.")]
    SameName,

    /// Name has whitespace or is out of the length range
    #[error("Names must be {min}-{max} characters without spaces, please try again.")]
    InvalidName { min: usize, max: usize },

    /// Name shaped like a peer address
    #[error("Name '{0}' is reserved for peer addresses, please try again.")]
    ReservedName(String),

    /// Name held by another session
    #[error("Name '{0}' is already taken, please try again.")]
    NameTaken(String),

    /// Private message target is not online
    #[error("No user named '{0}' is online, please try again.")]
    NoSuchUser(String),

    /// Private message addressed to the sender
    #[error("You cannot send a private message to yourself.")]
    SelfMessage,
}

impl From<RegistryError> for CommandError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NameTaken(name) => CommandError::NameTaken(name),
            RegistryError::SameName => CommandError::SameName,
            RegistryError::NotFound(name) => CommandError::NoSuchUser(name),
        }
    }
}

/// Message send errors
///
/// Occurs when pushing onto a mailbox that has already been closed.
#[derive(Debug, Error)]
pub enum SendError {
    /// The mailbox was closed at teardown
    #[error("Mailbox closed")]
    MailboxClosed,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFailed(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file {0}: {1}")]
    ParseFailed(PathBuf, #[source] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
