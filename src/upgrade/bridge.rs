use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::connection::Connection;
use super::handler::{ConnectionContext, ConnectionFactory};
use crate::error::RegistrationError;
use crate::ids::ConnectionId;
use crate::session::{Outbound, Session, SessionRegistry};
use crate::template::normalize;

/// Exact-path upgrade bindings plus the registry their connections join.
#[derive(Default)]
pub struct UpgradeBridge {
    bindings: HashMap<String, ConnectionFactory>,
    sessions: Arc<SessionRegistry>,
}

impl UpgradeBridge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `factory` to `path`, slash-collapsed.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::DuplicateUpgrade`] when the path is already bound.
    pub fn register(&mut self, path: &str, factory: ConnectionFactory) -> Result<(), RegistrationError> {
        let path = normalize(path);
        if self.bindings.contains_key(&path) {
            return Err(RegistrationError::DuplicateUpgrade { path });
        }
        info!(method = "UPGRADE", pattern = %path, "Upgrade registered");
        self.bindings.insert(path, factory);
        Ok(())
    }

    /// Exact string comparison; templates and prefixes do not apply.
    #[must_use]
    pub fn is_upgrade_path(&self, target: &str) -> bool {
        self.bindings.contains_key(target)
    }

    /// Bound paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Create a pending connection for an upgrade on `target`.
    ///
    /// Returns `None` when `target` is not bound; the runtime should refuse
    /// the handshake.
    #[must_use]
    pub fn accept(&self, target: &str, outbound: Arc<dyn Outbound>) -> Option<Connection> {
        let Some((path, factory)) = self.bindings.get_key_value(target) else {
            debug!(target = %target, "No upgrade binding");
            return None;
        };

        let session = Session::new(ConnectionId::new(), outbound);
        let ctx = ConnectionContext::new(session, Arc::clone(&self.sessions), Arc::from(path.as_str()));
        Some(Connection::new(factory(), ctx))
    }
}

impl fmt::Debug for UpgradeBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeBridge")
            .field("paths", &self.paths())
            .field("sessions", &self.sessions)
            .finish()
    }
}
