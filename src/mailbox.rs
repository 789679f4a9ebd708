//! Per-session outbound mailbox
//!
//! A thin wrapper around an unbounded `mpsc` channel. Pushing never waits,
//! so a slow client cannot stall a broadcast. The single sender lives
//! behind a lock so teardown can close the mailbox exactly once while
//! other sessions may still be pushing into it.

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::SendError;

/// Receiving half, drained by the session's delivery loop
pub type MailboxReceiver = mpsc::UnboundedReceiver<String>;

/// Sending half of a session mailbox
#[derive(Debug)]
pub struct Mailbox {
    sender: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl Mailbox {
    /// Create a mailbox and its receiving half
    pub fn new() -> (Self, MailboxReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mailbox = Self {
            sender: Mutex::new(Some(tx)),
        };
        (mailbox, rx)
    }

    /// Enqueue one line without blocking
    pub fn push(&self, line: String) -> Result<(), SendError> {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.send(line).map_err(|_| SendError::MailboxClosed),
            None => Err(SendError::MailboxClosed),
        }
    }

    /// Close the mailbox
    ///
    /// Lines already queued are still delivered; the receiver ends after
    /// them. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        self.sender.lock().take().is_some()
    }

    /// Whether `close` has run
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_is_fifo() {
        let (mailbox, mut rx) = Mailbox::new();
        mailbox.push("one".into()).unwrap();
        mailbox.push("two".into()).unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("one"));
        assert_eq!(rx.recv().await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_close_once_then_drain() {
        let (mailbox, mut rx) = Mailbox::new();
        mailbox.push("last".into()).unwrap();

        assert!(mailbox.close());
        assert!(!mailbox.close());
        assert!(mailbox.is_closed());
        assert!(matches!(
            mailbox.push("late".into()),
            Err(SendError::MailboxClosed)
        ));

        assert_eq!(rx.recv().await.as_deref(), Some("last"));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_push_after_receiver_dropped() {
        let (mailbox, rx) = Mailbox::new();
        drop(rx);
        assert!(mailbox.push("nobody".into()).is_err());
    }
}
