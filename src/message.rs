//! Wire text definitions
//!
//! Everything the server writes to a client is one line of plain text.
//! `Broadcast` is fanned out through the registry; `Notice` goes to a
//! single session.

use std::fmt;
use std::time::Duration;

use crate::error::CommandError;

/// Names per row in the `who` reply
pub const ROSTER_ROW_SIZE: usize = 5;

/// Author of a broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Authored by the server itself
    Server,
    /// Attributed to the session holding this name
    Session(String),
}

/// Immutable origin-tagged message for every registered session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    pub origin: Origin,
    pub body: String,
}

impl Broadcast {
    /// Server-authored broadcast
    pub fn server(body: impl Into<String>) -> Self {
        Self {
            origin: Origin::Server,
            body: body.into(),
        }
    }

    /// Broadcast attributed to a named session
    pub fn from_session(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            origin: Origin::Session(name.into()),
            body: body.into(),
        }
    }
}

impl fmt::Display for Broadcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Origin::Server => write!(f, "~ [Server] : {}", self.body),
            Origin::Session(name) => write!(f, "# [{}] : {}", name, self.body),
        }
    }
}

/// Server → single client line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Greeting after a successful registration
    Welcome { online: usize },
    /// Reply to `num`
    OnlineCount { online: usize },
    /// First line of the `who` reply
    RosterHeader { online: usize },
    /// One row of up to `ROSTER_ROW_SIZE` names
    RosterRow(Vec<String>),
    /// Asks for the new name after `rename`
    RenamePrompt { min: usize, max: usize },
    /// Rename accepted
    Renamed { name: String },
    /// Asks for the private message body after `to-<name>`
    MessagePrompt { target: String },
    /// Private message delivered to its target
    Private { from: String, body: String },
    /// Voluntary exit acknowledged
    Offline,
    /// Idle timeout expired
    ForcedOffline { idle: Duration },
    /// Registration refused; the connection closes after this line
    Refused { name: String },
    /// Validation failure
    Error(CommandError),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Welcome { online } => write!(
                f,
                "Welcome to the chat server, {} user(s) online.",
                online
            ),
            Notice::OnlineCount { online } => write!(f, "{} user(s) online.", online),
            Notice::RosterHeader { online } => write!(f, "{} user(s) online:", online),
            Notice::RosterRow(names) => {
                for name in names {
                    write!(f, "[{}]; ", name)?;
                }
                Ok(())
            }
            Notice::RenamePrompt { min, max } => write!(
                f,
                "Enter a new name ({}-{} characters, no spaces):",
                min, max
            ),
            Notice::Renamed { name } => write!(f, "Your name is now {}.", name),
            Notice::MessagePrompt { target } => write!(f, "Enter your message for {}:", target),
            Notice::Private { from, body } => write!(f, "[{}] whispers to you : {}", from, body),
            Notice::Offline => write!(f, "You are offline."),
            Notice::ForcedOffline { idle } => write!(
                f,
                "You have been forced offline after {:?} of inactivity.",
                idle
            ),
            Notice::Refused { name } => {
                write!(f, "Name '{}' is already in use, closing connection.", name)
            }
            Notice::Error(err) => write!(f, "{}", err),
        }
    }
}

/// Convert CommandError to Notice for client notification
impl From<CommandError> for Notice {
    fn from(err: CommandError) -> Self {
        Notice::Error(err)
    }
}

/// Split a name list into `who` reply rows
pub fn roster_rows(names: &[String]) -> Vec<Notice> {
    names
        .chunks(ROSTER_ROW_SIZE)
        .map(|chunk| Notice::RosterRow(chunk.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_rendering() {
        assert_eq!(
            Broadcast::from_session("alice", "hi all").to_string(),
            "# [alice] : hi all"
        );
        assert_eq!(
            Broadcast::server("restarting").to_string(),
            "~ [Server] : restarting"
        );
    }

    #[test]
    fn test_private_rendering() {
        let notice = Notice::Private {
            from: "alice".into(),
            body: "hello".into(),
        };
        assert_eq!(notice.to_string(), "[alice] whispers to you : hello");
    }

    #[test]
    fn test_roster_rows_chunk_by_five() {
        let names: Vec<String> = (0..7).map(|i| format!("user{}", i)).collect();
        let rows = roster_rows(&names);

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].to_string(),
            "[user0]; [user1]; [user2]; [user3]; [user4]; "
        );
        assert_eq!(rows[1].to_string(), "[user5]; [user6]; ");
    }

    #[test]
    fn test_forced_offline_rendering() {
        let notice = Notice::ForcedOffline {
            idle: Duration::from_secs(120),
        };
        assert_eq!(
            notice.to_string(),
            "You have been forced offline after 120s of inactivity."
        );
    }

    #[test]
    fn test_roster_rows_empty() {
        assert!(roster_rows(&[]).is_empty());
    }

    #[test]
    fn test_error_notice_uses_error_text() {
        let notice: Notice = CommandError::SelfMessage.into();
        assert_eq!(
            notice.to_string(),
            "You cannot send a private message to yourself."
        );
    }

    #[test]
    fn test_refused_rendering() {
        let notice = Notice::Refused {
            name: "10.0.0.2:6000".into(),
        };
        assert_eq!(
            notice.to_string(),
            "Name '10.0.0.2:6000' is already in use, closing connection."
        );
    }
}
