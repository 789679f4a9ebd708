//! Session state and command interpreter
//!
//! A `Session` is the server-side half of one connection: its identity,
//! its mailbox, and any prompt it is waiting on. Input lines are turned
//! into registry operations by [`Session::interpret`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::SinkExt;
use parking_lot::Mutex;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;
use tracing::{debug, info};

use crate::codec::LineCodec;
use crate::config::{ProtocolVariant, ServerConfig};
use crate::error::{AppError, CommandError, RegistryError, SendError};
use crate::mailbox::{Mailbox, MailboxReceiver};
use crate::message::{roster_rows, Broadcast, Notice};
use crate::registry::Registry;
use crate::types::SessionId;

/// Result of interpreting one input line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Input rejected; does not count as activity
    Continue,
    /// Input handled; resets the idle timer
    Active,
    /// Client asked to leave
    Terminate,
}

/// Why a session went offline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineReason {
    /// `exit` command
    Exit,
    /// Client closed the stream
    Disconnected,
    /// No activity within the idle window
    IdleTimeout,
    /// Read or write failure on the connection
    IoError,
}

/// Answer the session is waiting for
#[derive(Debug, Clone, PartialEq, Eq)]
enum Prompt {
    Idle,
    NewName,
    /// The target is bound by id so a later rename cannot redirect the body.
    MessageBody { target: String, id: SessionId },
}

/// A parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Exit,
    Who,
    Num,
    /// Interactive `rename`; the name follows on the next line
    RenamePrompt,
    /// Compact `rename-<name>`
    Rename(&'a str),
    /// `to-<name>`, with the body inline in the compact variant
    Whisper { target: &'a str, body: Option<&'a str> },
    Public(&'a str),
}

impl<'a> Command<'a> {
    /// Parse a non-empty line according to the active protocol variant
    pub fn parse(line: &'a str, variant: ProtocolVariant) -> Self {
        match line {
            "exit" => return Command::Exit,
            "who" => return Command::Who,
            "num" => return Command::Num,
            _ => {}
        }

        match variant {
            ProtocolVariant::Interactive => {
                if line == "rename" {
                    return Command::RenamePrompt;
                }
                if let Some(target) = line.strip_prefix("to-").filter(|t| !t.is_empty()) {
                    return Command::Whisper { target, body: None };
                }
            }
            ProtocolVariant::Compact => {
                if let Some(name) = line.strip_prefix("rename-").filter(|n| !n.is_empty()) {
                    return Command::Rename(name);
                }
                if let Some(rest) = line.strip_prefix("to-").filter(|r| !r.is_empty()) {
                    let (target, body) = match rest.split_once(char::is_whitespace) {
                        Some((target, body)) => (target, body.trim_start()),
                        None => (rest, ""),
                    };
                    return Command::Whisper {
                        target,
                        body: Some(body),
                    };
                }
            }
        }

        Command::Public(line)
    }
}

/// Check a requested name against the configured rules
///
/// Names that parse as a socket address are reserved: new sessions are
/// named after their peer address and must be able to register.
pub fn validate_name(name: &str, min: usize, max: usize) -> Result<(), CommandError> {
    let len = name.chars().count();
    if len < min || len > max || name.chars().any(char::is_whitespace) {
        return Err(CommandError::InvalidName { min, max });
    }
    if name.parse::<SocketAddr>().is_ok() {
        return Err(CommandError::ReservedName(name.to_string()));
    }
    Ok(())
}

/// Server-side state for one connected client
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    /// Peer address the session was accepted from
    address: String,
    name: Mutex<String>,
    mailbox: Mailbox,
    prompt: Mutex<Prompt>,
    offline: AtomicBool,
    config: Arc<ServerConfig>,
}

impl Session {
    /// Create a session named after its peer address
    ///
    /// Returns the session and the receiving end of its mailbox, which
    /// belongs to the delivery loop.
    pub fn new(address: String, config: Arc<ServerConfig>) -> (Arc<Self>, MailboxReceiver) {
        let (mailbox, receiver) = Mailbox::new();
        let session = Arc::new(Self {
            id: SessionId::new(),
            name: Mutex::new(address.clone()),
            address,
            mailbox,
            prompt: Mutex::new(Prompt::Idle),
            offline: AtomicBool::new(false),
            config,
        });
        (session, receiver)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Current display name
    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    /// Only the registry renames, while holding its table lock.
    pub(crate) fn set_name(&self, name: String) {
        *self.name.lock() = name;
    }

    /// Enqueue one outbound line
    pub fn send(&self, line: impl Into<String>) -> Result<(), SendError> {
        self.mailbox.push(line.into())
    }

    /// Send a notice, ignoring a closed mailbox
    pub fn notify(&self, notice: Notice) {
        if self.send(notice.to_string()).is_err() {
            debug!("Dropped notice for closed session {}", self.id);
        }
    }

    /// Close the mailbox; returns `false` if it was already closed
    pub fn close_mailbox(&self) -> bool {
        self.mailbox.close()
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Acquire)
    }

    /// Register, announce, and greet
    ///
    /// Returns the participant count included in the welcome notice.
    pub fn go_online(self: &Arc<Self>, registry: &Registry) -> Result<usize, AppError> {
        if self.is_offline() {
            return Err(AppError::SessionOffline(self.id));
        }
        registry.register(Arc::clone(self))?;

        let name = self.name();
        registry.broadcast(&Broadcast::from_session(&name, "is online!"));
        let online = registry.count();
        self.notify(Notice::Welcome { online });

        info!("Client {} is online as '{}'", self.id, name);
        Ok(online)
    }

    /// Tear the session down
    ///
    /// Runs at most once per session: announces the departure, removes
    /// the registry entry and closes the mailbox. Later calls return
    /// `false` and do nothing.
    pub fn go_offline(&self, registry: &Registry, reason: OfflineReason) -> bool {
        if self.offline.swap(true, Ordering::AcqRel) {
            return false;
        }

        match reason {
            OfflineReason::Exit => self.notify(Notice::Offline),
            OfflineReason::IdleTimeout => self.notify(Notice::ForcedOffline {
                idle: self.config.idle_timeout(),
            }),
            OfflineReason::Disconnected | OfflineReason::IoError => {}
        }

        let name = self.name();
        registry.broadcast(&Broadcast::from_session(&name, "is offline."));
        registry.unregister(self);
        self.mailbox.close();

        info!("Client {} ('{}') offline: {:?}", self.id, name, reason);
        true
    }

    /// Interpret one input line (terminator already removed)
    pub fn interpret(&self, registry: &Registry, line: &str) -> Outcome {
        if self.is_offline() {
            return Outcome::Terminate;
        }
        if line.is_empty() {
            self.notify(CommandError::EmptyInput.into());
            return Outcome::Continue;
        }

        // Any non-blank line answers a pending prompt.
        let prompt = std::mem::replace(&mut *self.prompt.lock(), Prompt::Idle);
        match prompt {
            Prompt::NewName => {
                self.rename(registry, line);
                return Outcome::Active;
            }
            Prompt::MessageBody { target, id } => {
                self.whisper(registry, &target, id, line);
                return Outcome::Active;
            }
            Prompt::Idle => {}
        }

        match Command::parse(line, self.config.protocol) {
            Command::Exit => return Outcome::Terminate,
            Command::Who => self.who(registry),
            Command::Num => self.notify(Notice::OnlineCount {
                online: registry.count(),
            }),
            Command::RenamePrompt => {
                *self.prompt.lock() = Prompt::NewName;
                self.notify(Notice::RenamePrompt {
                    min: self.config.name_min_len,
                    max: self.config.name_max_len,
                });
            }
            Command::Rename(name) => self.rename(registry, name),
            Command::Whisper { target, body } => match self.check_target(registry, target) {
                Err(err) => self.notify(err.into()),
                Ok(id) => match body {
                    Some(body) => self.whisper(registry, target, id, body),
                    None => {
                        *self.prompt.lock() = Prompt::MessageBody {
                            target: target.to_string(),
                            id,
                        };
                        self.notify(Notice::MessagePrompt {
                            target: target.to_string(),
                        });
                    }
                },
            },
            Command::Public(text) => {
                registry.broadcast_from(self, &Broadcast::from_session(self.name(), text));
            }
        }
        Outcome::Active
    }

    /// Reply to an over-length line; not counted as activity
    pub fn reject_overlong(&self) -> Outcome {
        self.notify(
            CommandError::InputTooLong {
                max: self.config.max_line_length,
            }
            .into(),
        );
        Outcome::Continue
    }

    /// Write mailbox lines to the connection in FIFO order
    ///
    /// Ends when the mailbox is closed and drained, then shuts down the
    /// write half. Stops at the first write error.
    pub async fn deliver_loop<W>(mut mailbox: MailboxReceiver, writer: W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut sink = FramedWrite::new(writer, LineCodec::default());
        while let Some(line) = mailbox.recv().await {
            sink.send(line).await?;
        }
        sink.close().await
    }

    fn who(&self, registry: &Registry) {
        let names = registry.list();
        self.notify(Notice::RosterHeader {
            online: names.len(),
        });
        for row in roster_rows(&names) {
            self.notify(row);
        }
    }

    fn rename(&self, registry: &Registry, new_name: &str) {
        let old_name = self.name();
        let result = if new_name == old_name {
            Err(CommandError::SameName)
        } else {
            validate_name(new_name, self.config.name_min_len, self.config.name_max_len)
                .and_then(|()| registry.rename(&old_name, new_name).map_err(CommandError::from))
        };

        match result {
            Ok(()) => {
                info!("Client {} renamed '{}' -> '{}'", self.id, old_name, new_name);
                self.notify(Notice::Renamed {
                    name: new_name.to_string(),
                });
                registry.broadcast_from(
                    self,
                    &Broadcast::server(format!("{} is now known as {}", old_name, new_name)),
                );
            }
            Err(err) => self.notify(err.into()),
        }
    }

    fn check_target(&self, registry: &Registry, target: &str) -> Result<SessionId, CommandError> {
        if target == self.name() {
            return Err(CommandError::SelfMessage);
        }
        registry
            .resolve(target)
            .ok_or_else(|| RegistryError::NotFound(target.to_string()).into())
    }

    fn whisper(&self, registry: &Registry, target: &str, id: SessionId, body: &str) {
        if body.is_empty() {
            self.notify(CommandError::EmptyInput.into());
            return;
        }
        let notice = Notice::Private {
            from: self.name(),
            body: body.to_string(),
        };
        if !registry.send_to(id, notice.to_string()) {
            self.notify(CommandError::NoSuchUser(target.to_string()).into());
        }
    }
}
