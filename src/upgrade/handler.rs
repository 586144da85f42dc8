use std::io;
use std::sync::Arc;

use crate::ids::ConnectionId;
use crate::session::{Session, SessionRegistry};

/// Per-connection event handler.
///
/// One instance serves exactly one connection, so implementations may keep
/// per-connection state in `self` without synchronization. Events for one
/// connection never overlap.
pub trait ConnectionHandler: Send {
    /// The connection is open and registered.
    ///
    /// # Errors
    ///
    /// An error is logged and the runtime closes the connection.
    fn on_connect(&mut self, _ctx: &ConnectionContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// A text message arrived.
    ///
    /// # Errors
    ///
    /// An error is logged and the runtime closes the connection.
    fn on_message(&mut self, ctx: &ConnectionContext, text: &str) -> anyhow::Result<()>;

    /// The connection closed. Runs exactly once per opened connection.
    fn on_close(&mut self, _ctx: &ConnectionContext, _code: u16, _reason: &str) {}
}

/// Produces a fresh handler for every accepted connection.
pub type ConnectionFactory = Arc<dyn Fn() -> Box<dyn ConnectionHandler> + Send + Sync>;

/// What a [`ConnectionHandler`] can see and do.
#[derive(Clone, Debug)]
pub struct ConnectionContext {
    session: Session,
    sessions: Arc<SessionRegistry>,
    path: Arc<str>,
}

impl ConnectionContext {
    pub(crate) fn new(session: Session, sessions: Arc<SessionRegistry>, path: Arc<str>) -> Self {
        Self {
            session,
            sessions,
            path,
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.session.id()
    }

    /// The upgrade path this connection was accepted on.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Every live session, this one included once it is open.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Reply to this connection's peer.
    ///
    /// # Errors
    ///
    /// [`io::Error`] from the transport.
    pub fn send(&self, text: &str) -> io::Result<()> {
        self.session.send_text(text)
    }

    /// Ask the runtime to close this connection. `on_close` follows once the
    /// runtime has done so.
    ///
    /// # Errors
    ///
    /// [`io::Error`] from the transport.
    pub fn close(&self, code: u16, reason: &str) -> io::Result<()> {
        self.session.close(code, reason)
    }

    /// Send to every other live session.
    pub fn broadcast(&self, text: &str) -> Vec<(ConnectionId, io::Error)> {
        self.sessions.broadcast_except(self.id(), text)
    }
}
