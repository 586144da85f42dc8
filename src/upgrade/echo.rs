use tracing::debug;

use super::handler::{ConnectionContext, ConnectionHandler};

/// Sends every text message straight back to its sender.
#[derive(Debug, Default)]
pub struct EchoConnection {
    echoed: usize,
}

impl EchoConnection {
    /// Messages echoed so far on this connection.
    #[must_use]
    pub fn echoed(&self) -> usize {
        self.echoed
    }
}

impl ConnectionHandler for EchoConnection {
    fn on_message(&mut self, ctx: &ConnectionContext, text: &str) -> anyhow::Result<()> {
        ctx.send(text)?;
        self.echoed += 1;
        Ok(())
    }

    fn on_close(&mut self, ctx: &ConnectionContext, code: u16, reason: &str) {
        debug!(
            connection_id = %ctx.id(),
            path = %ctx.path(),
            code,
            reason,
            echoed = self.echoed,
            "Echo connection closed"
        );
    }
}
