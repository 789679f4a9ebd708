//! Session registry and broadcaster
//!
//! The shared directory of online sessions, keyed by display name.
//! Every operation takes the same lock, so registration, renames,
//! removals and fan-out are serialized against each other. A broadcast
//! therefore sees a consistent table and lands in every mailbox in the
//! same relative order as other broadcasts.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::RegistryError;
use crate::message::Broadcast;
use crate::session::Session;
use crate::types::SessionId;

/// Cloneable handle to one server's session table
#[derive(Debug, Clone, Default)]
pub struct Registry {
    sessions: Arc<Mutex<HashMap<String, Arc<Session>>>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session under its current name (compare-and-insert)
    pub fn register(&self, session: Arc<Session>) -> Result<(), RegistryError> {
        let mut sessions = self.sessions.lock();
        let name = session.name();
        if sessions.contains_key(&name) {
            return Err(RegistryError::NameTaken(name));
        }
        debug!("Registered {} as '{}'", session.id(), name);
        sessions.insert(name, session);
        Ok(())
    }

    /// Remove the entry held by this session under its current name
    ///
    /// No-op if the name is absent or now belongs to a different session.
    /// Returns whether an entry was removed.
    pub fn unregister(&self, session: &Session) -> bool {
        let mut sessions = self.sessions.lock();
        let name = session.name();
        match sessions.get(&name) {
            Some(entry) if entry.id() == session.id() => {
                sessions.remove(&name);
                debug!("Unregistered {} ('{}')", session.id(), name);
                true
            }
            _ => false,
        }
    }

    /// Atomically re-key `old_name` to `new_name` and update the session
    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<(), RegistryError> {
        if old_name == new_name {
            return Err(RegistryError::SameName);
        }

        let mut sessions = self.sessions.lock();
        if sessions.contains_key(new_name) {
            return Err(RegistryError::NameTaken(new_name.to_string()));
        }
        let session = sessions
            .remove(old_name)
            .ok_or_else(|| RegistryError::NotFound(old_name.to_string()))?;
        session.set_name(new_name.to_string());
        sessions.insert(new_name.to_string(), session);
        Ok(())
    }

    /// Push a message onto every registered mailbox
    ///
    /// Returns the number of mailboxes that accepted it.
    pub fn broadcast(&self, message: &Broadcast) -> usize {
        let line = message.to_string();
        let sessions = self.sessions.lock();
        Self::fan_out(&sessions, &line)
    }

    /// Broadcast on behalf of `sender`, unless it has already gone offline
    ///
    /// The offline flag is checked under the table lock, so nothing from
    /// the sender can land after its offline announcement.
    pub fn broadcast_from(&self, sender: &Session, message: &Broadcast) -> Option<usize> {
        let line = message.to_string();
        let sessions = self.sessions.lock();
        if sender.is_offline() {
            debug!("Dropped broadcast from offline session {}", sender.id());
            return None;
        }
        Some(Self::fan_out(&sessions, &line))
    }

    fn fan_out(sessions: &HashMap<String, Arc<Session>>, line: &str) -> usize {
        sessions
            .values()
            .filter(|session| session.send(line).is_ok())
            .count()
    }

    /// Id of the session currently holding `name`
    pub fn resolve(&self, name: &str) -> Option<SessionId> {
        self.sessions.lock().get(name).map(|session| session.id())
    }

    /// Push a line onto one session's mailbox, whatever name it now holds
    ///
    /// Returns `false` if the session is no longer registered.
    pub fn send_to(&self, id: SessionId, line: String) -> bool {
        let sessions = self.sessions.lock();
        sessions
            .values()
            .find(|session| session.id() == id)
            .is_some_and(|target| target.send(line).is_ok())
    }

    /// Whether a session currently holds `name`
    pub fn contains(&self, name: &str) -> bool {
        self.sessions.lock().contains_key(name)
    }

    /// Number of registered sessions
    pub fn count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Snapshot of all names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::mailbox::MailboxReceiver;
    use crate::session::OfflineReason;

    fn session(name: &str) -> (Arc<Session>, MailboxReceiver) {
        Session::new(name.to_string(), Arc::new(ServerConfig::default()))
    }

    fn drain(rx: &mut MailboxReceiver) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_register_rejects_duplicate_name() {
        let registry = Registry::new();
        let (a, _rx_a) = session("alice");
        let (impostor, _rx_i) = session("alice");

        registry.register(a).unwrap();
        assert_eq!(
            registry.register(impostor),
            Err(RegistryError::NameTaken("alice".into()))
        );
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = Registry::new();
        let (a, _rx) = session("alice");
        registry.register(a.clone()).unwrap();

        assert!(registry.unregister(&a));
        assert!(!registry.unregister(&a));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_unregister_ignores_other_holder_of_name() {
        let registry = Registry::new();
        let (stale, _rx_s) = session("alice");
        let (current, _rx_c) = session("alice");
        registry.register(current.clone()).unwrap();

        assert!(!registry.unregister(&stale));
        assert!(registry.contains("alice"));
    }

    #[test]
    fn test_rename_rekeys_and_updates_session() {
        let registry = Registry::new();
        let (a, _rx) = session("alice");
        registry.register(a.clone()).unwrap();

        registry.rename("alice", "alicia").unwrap();

        assert_eq!(a.name(), "alicia");
        assert!(!registry.contains("alice"));
        assert!(registry.contains("alicia"));
    }

    #[test]
    fn test_rename_rejections_leave_state_untouched() {
        let registry = Registry::new();
        let (a, _rx_a) = session("alice");
        let (b, _rx_b) = session("bob");
        registry.register(a.clone()).unwrap();
        registry.register(b.clone()).unwrap();

        assert_eq!(
            registry.rename("alice", "bob"),
            Err(RegistryError::NameTaken("bob".into()))
        );
        assert_eq!(registry.rename("alice", "alice"), Err(RegistryError::SameName));
        assert_eq!(
            registry.rename("carol", "dave"),
            Err(RegistryError::NotFound("carol".into()))
        );

        assert_eq!(a.name(), "alice");
        assert_eq!(b.name(), "bob");
        assert_eq!(registry.list(), vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn test_concurrent_renames_to_same_target() {
        for _ in 0..50 {
            let registry = Registry::new();
            let (a, _rx_a) = session("alice");
            let (b, _rx_b) = session("bob");
            registry.register(a.clone()).unwrap();
            registry.register(b.clone()).unwrap();

            let handles: Vec<_> = ["alice", "bob"]
                .into_iter()
                .map(|old| {
                    let registry = registry.clone();
                    std::thread::spawn(move || registry.rename(old, "zed"))
                })
                .collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            let wins = results.iter().filter(|r| r.is_ok()).count();
            let taken = results
                .iter()
                .filter(|r| **r == Err(RegistryError::NameTaken("zed".into())))
                .count();
            assert_eq!((wins, taken), (1, 1));
            assert_eq!(registry.count(), 2);
            let holders = [a.name(), b.name()]
                .iter()
                .filter(|name| *name == "zed")
                .count();
            assert_eq!(holders, 1);
        }
    }

    #[test]
    fn test_broadcast_reaches_registered_sessions_only() {
        let registry = Registry::new();
        let (a, mut rx_a) = session("alice");
        let (b, mut rx_b) = session("bob");
        let (_c, mut rx_c) = session("carol");
        registry.register(a).unwrap();
        registry.register(b).unwrap();

        let delivered = registry.broadcast(&Broadcast::from_session("alice", "hi"));

        assert_eq!(delivered, 2);
        assert_eq!(drain(&mut rx_a), vec!["# [alice] : hi".to_string()]);
        assert_eq!(drain(&mut rx_b), vec!["# [alice] : hi".to_string()]);
        assert!(drain(&mut rx_c).is_empty());
    }

    #[test]
    fn test_broadcast_keeps_order_per_mailbox() {
        let registry = Registry::new();
        let (a, mut rx_a) = session("alice");
        registry.register(a).unwrap();

        for i in 0..10 {
            registry.broadcast(&Broadcast::server(format!("tick {}", i)));
        }

        let expected: Vec<String> = (0..10).map(|i| format!("~ [Server] : tick {}", i)).collect();
        assert_eq!(drain(&mut rx_a), expected);
    }

    #[test]
    fn test_broadcast_skips_closed_mailbox() {
        let registry = Registry::new();
        let (a, _rx_a) = session("alice");
        let (b, mut rx_b) = session("bob");
        registry.register(a.clone()).unwrap();
        registry.register(b).unwrap();
        a.close_mailbox();

        assert_eq!(registry.broadcast(&Broadcast::server("still here?")), 1);
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[test]
    fn test_send_to_follows_session_across_renames() {
        let registry = Registry::new();
        let (b, mut rx_b) = session("bob");
        let (c, mut rx_c) = session("carol");
        registry.register(b.clone()).unwrap();
        registry.register(c).unwrap();
        let bob = registry.resolve("bob").unwrap();
        assert_eq!(bob, b.id());

        registry.rename("bob", "robert").unwrap();
        registry.rename("carol", "bob").unwrap();

        assert!(registry.send_to(bob, "psst".into()));
        assert_eq!(drain(&mut rx_b), vec!["psst".to_string()]);
        assert!(drain(&mut rx_c).is_empty());
        assert_eq!(registry.resolve("eve"), None);
    }

    #[test]
    fn test_send_to_unregistered_session() {
        let registry = Registry::new();
        let (b, _rx_b) = session("bob");
        registry.register(b.clone()).unwrap();
        registry.unregister(&b);

        assert!(!registry.send_to(b.id(), "psst".into()));
    }

    #[test]
    fn test_broadcast_from_offline_sender_is_dropped() {
        let registry = Registry::new();
        let (a, _rx_a) = session("alice");
        let (b, mut rx_b) = session("bob");
        registry.register(a.clone()).unwrap();
        registry.register(b).unwrap();

        assert_eq!(
            registry.broadcast_from(&a, &Broadcast::from_session("alice", "early")),
            Some(2)
        );
        a.go_offline(&registry, OfflineReason::Disconnected);
        assert_eq!(
            registry.broadcast_from(&a, &Broadcast::from_session("alice", "late")),
            None
        );

        assert_eq!(
            drain(&mut rx_b),
            vec![
                "# [alice] : early".to_string(),
                "# [alice] : is offline.".to_string(),
            ]
        );
    }

    #[test]
    fn test_independent_registries() {
        let first = Registry::new();
        let second = Registry::new();
        let (a, _rx) = session("alice");
        first.register(a).unwrap();

        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 0);
    }
}
