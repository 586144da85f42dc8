use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, info, warn};

use super::handler::{ConnectionContext, ConnectionHandler};
use crate::error::LifecycleError;
use crate::ids::ConnectionId;

/// Close code reported when a connection ends without a close handshake.
pub const ABNORMAL_CLOSURE: u16 = 1006;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Pending,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Pending => "pending",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        })
    }
}

/// One accepted upgrade and the handler instance that serves it.
///
/// Every method takes `&mut self`, so events for one connection are delivered
/// one at a time by whoever owns it.
pub struct Connection {
    state: ConnectionState,
    handler: Box<dyn ConnectionHandler>,
    ctx: ConnectionContext,
}

impl Connection {
    pub(crate) fn new(handler: Box<dyn ConnectionHandler>, ctx: ConnectionContext) -> Self {
        Self {
            state: ConnectionState::Pending,
            handler,
            ctx,
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.ctx.id()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn context(&self) -> &ConnectionContext {
        &self.ctx
    }

    /// Open the connection: register its session, then run `on_connect`.
    ///
    /// The connection is open afterwards even when `on_connect` fails, so a
    /// later [`Connection::close`] still reaches the handler.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::NotOpen`] when the connection is not pending
    /// - the handler's own error from `on_connect`
    pub fn connect(&mut self) -> anyhow::Result<()> {
        if self.state != ConnectionState::Pending {
            return Err(self.not_open().into());
        }

        self.ctx.sessions().add(self.ctx.session().clone());
        self.state = ConnectionState::Open;
        info!(
            connection_id = %self.id(),
            path = %self.ctx.path(),
            live_sessions = self.ctx.sessions().len(),
            "Connection opened"
        );

        let (handler, ctx) = (&mut self.handler, &self.ctx);
        guarded("on_connect", || handler.on_connect(ctx))
    }

    /// Deliver one text message.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::NotOpen`] before `connect` or after `close`
    /// - the handler's own error from `on_message`
    pub fn message(&mut self, text: &str) -> anyhow::Result<()> {
        if self.state != ConnectionState::Open {
            warn!(
                connection_id = %self.id(),
                state = %self.state,
                "Message outside open state dropped"
            );
            return Err(self.not_open().into());
        }

        debug!(connection_id = %self.id(), len = text.len(), "Message received");
        let (handler, ctx) = (&mut self.handler, &self.ctx);
        guarded("on_message", || handler.on_message(ctx, text))
    }

    /// Close the connection and run `on_close`.
    ///
    /// Only the first close of an open connection has any effect.
    pub fn close(&mut self, code: u16, reason: &str) {
        if self.state != ConnectionState::Open {
            return;
        }
        self.state = ConnectionState::Closed;

        let (handler, ctx) = (&mut self.handler, &self.ctx);
        let outcome = catch_unwind(AssertUnwindSafe(|| handler.on_close(ctx, code, reason)));
        if outcome.is_err() {
            error!(connection_id = %self.id(), "on_close panicked");
        }

        self.ctx.sessions().remove(self.id());
        info!(
            connection_id = %self.id(),
            path = %self.ctx.path(),
            code,
            reason,
            live_sessions = self.ctx.sessions().len(),
            "Connection closed"
        );
    }

    fn not_open(&self) -> LifecycleError {
        LifecycleError::NotOpen {
            path: self.ctx.path().to_string(),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.state == ConnectionState::Open {
            self.close(ABNORMAL_CLOSURE, "abnormal closure");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("path", &self.ctx.path())
            .field("state", &self.state)
            .finish()
    }
}

fn guarded(event: &str, f: impl FnOnce() -> anyhow::Result<()>) -> anyhow::Result<()> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            Err(anyhow::anyhow!("{event} panicked: {message}"))
        }
    }
}
