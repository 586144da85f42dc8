//! Registry of live upgraded connections.
//!
//! A [`Session`] is the sending half of one upgraded connection. Handlers
//! reach other connections through the shared [`SessionRegistry`], which is
//! safe to use from any coroutine while connections come and go.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::ids::ConnectionId;

/// Outbound side of an established upgrade.
///
/// The runtime adapter implements this over its transport; tests implement
/// it over a `Vec`.
pub trait Outbound: Send + Sync {
    /// Queue a text frame for the peer.
    ///
    /// # Errors
    ///
    /// The transport is gone or refused the frame.
    fn send_text(&self, text: &str) -> io::Result<()>;

    /// Ask the transport to close the connection.
    ///
    /// # Errors
    ///
    /// The transport is already gone.
    fn close(&self, code: u16, reason: &str) -> io::Result<()>;
}

/// Cloneable handle to one live connection.
///
/// Equality is by connection id only.
#[derive(Clone)]
pub struct Session {
    id: ConnectionId,
    outbound: Arc<dyn Outbound>,
}

impl Session {
    #[must_use]
    pub fn new(id: ConnectionId, outbound: Arc<dyn Outbound>) -> Self {
        Self { id, outbound }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// # Errors
    ///
    /// [`io::Error`] from the transport.
    pub fn send_text(&self, text: &str) -> io::Result<()> {
        self.outbound.send_text(text)
    }

    /// # Errors
    ///
    /// [`io::Error`] from the transport.
    pub fn close(&self, code: u16, reason: &str) -> io::Result<()> {
        self.outbound.close(code, reason)
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Session {}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

/// De-duplicated set of live sessions keyed by [`ConnectionId`].
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<ConnectionId, Session>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `session`. Returns `false` when its id is already present, in
    /// which case the existing entry is kept.
    pub fn add(&self, session: Session) -> bool {
        let id = session.id();
        let inserted = match self.sessions.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(session);
                true
            }
        };
        // The entry guard is released here; len() locks every shard.
        if inserted {
            debug!(connection_id = %id, live = self.sessions.len(), "Session added");
        }
        inserted
    }

    /// Returns `false` when no session had this id.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let removed = self.sessions.remove(&id).is_some();
        if removed {
            debug!(connection_id = %id, live = self.sessions.len(), "Session removed");
        }
        removed
    }

    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of the live sessions, oldest first.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.sessions.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<Session> {
        self.sessions.get(&id).map(|e| e.value().clone())
    }

    /// Send a text frame to one session.
    ///
    /// A failed delivery leaves the session registered; the connection's own
    /// close event removes it.
    ///
    /// # Errors
    ///
    /// - [`SessionError::UnknownSession`] when `id` is not live
    /// - [`SessionError::Delivery`] when the transport refused the frame
    pub fn send(&self, id: ConnectionId, text: &str) -> Result<(), SessionError> {
        // Clone out of the map so no shard lock is held during I/O.
        let session = self.get(id).ok_or(SessionError::UnknownSession(id))?;
        session.send_text(text).map_err(SessionError::Delivery)
    }

    /// Send a text frame to every live session.
    ///
    /// Returns the sessions that could not be reached.
    pub fn broadcast(&self, text: &str) -> Vec<(ConnectionId, io::Error)> {
        self.deliver(text, None)
    }

    /// Like [`SessionRegistry::broadcast`], skipping `except`.
    pub fn broadcast_except(&self, except: ConnectionId, text: &str) -> Vec<(ConnectionId, io::Error)> {
        self.deliver(text, Some(except))
    }

    fn deliver(&self, text: &str, except: Option<ConnectionId>) -> Vec<(ConnectionId, io::Error)> {
        let targets: Vec<Session> = self
            .sessions
            .iter()
            .filter(|e| Some(*e.key()) != except)
            .map(|e| e.value().clone())
            .collect();

        let mut failures = Vec::new();
        for session in targets {
            if let Err(e) = session.send_text(text) {
                warn!(connection_id = %session.id(), error = %e, "Broadcast delivery failed");
                failures.push((session.id(), e));
            }
        }
        failures
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("live", &self.sessions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<String>>,
    }

    impl Outbound for Recorder {
        fn send_text(&self, text: &str) -> io::Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn close(&self, _code: u16, _reason: &str) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Outbound for Broken {
        fn send_text(&self, _text: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
        }

        fn close(&self, _code: u16, _reason: &str) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_add_is_idempotent_per_id() {
        let registry = SessionRegistry::new();
        let session = Session::new(ConnectionId::new(), Arc::new(Recorder::default()));
        assert!(registry.add(session.clone()));
        assert!(!registry.add(session.clone()));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(session.id()));
        assert!(!registry.remove(session.id()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_send_to_unknown_session() {
        let registry = SessionRegistry::new();
        let err = registry.send(ConnectionId::new(), "hi").unwrap_err();
        assert!(matches!(err, SessionError::UnknownSession(_)));
    }

    #[test]
    fn test_broadcast_except_skips_sender() {
        let registry = SessionRegistry::new();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let sa = Session::new(ConnectionId::new(), a.clone());
        let sb = Session::new(ConnectionId::new(), b.clone());
        registry.add(sa.clone());
        registry.add(sb);

        let failures = registry.broadcast_except(sa.id(), "joined");
        assert!(failures.is_empty());
        assert!(a.sent.lock().unwrap().is_empty());
        assert_eq!(*b.sent.lock().unwrap(), ["joined"]);
    }

    #[test]
    fn test_failed_delivery_keeps_session() {
        let registry = SessionRegistry::new();
        let s = Session::new(ConnectionId::new(), Arc::new(Broken));
        registry.add(s.clone());

        assert!(matches!(
            registry.send(s.id(), "x"),
            Err(SessionError::Delivery(_))
        ));
        let failures = registry.broadcast("y");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, s.id());
        assert!(registry.contains(s.id()));
    }
}
