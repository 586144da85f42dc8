//! # Upgrade Module
//!
//! Bridges requests for registered paths into persistent connections.
//!
//! An upgrade binding maps one exact path to a [`ConnectionFactory`]. When the
//! runtime completes a handshake for that path, [`UpgradeBridge::accept`] asks
//! the factory for a fresh [`ConnectionHandler`] and wraps it in a
//! [`Connection`], which enforces the event order:
//!
//! ```text
//! PENDING ──connect──▶ OPEN ──message*──▶ OPEN ──close──▶ CLOSED
//! ```
//!
//! `on_close` runs exactly once for every connection that was opened, even if
//! the runtime drops the connection without a close frame.
//!
//! ## Example
//!
//! ```rust
//! use panrouter::router::Router;
//! use panrouter::upgrade::{ConnectionHandler, EchoConnection};
//!
//! let mut router = Router::new();
//! router
//!     .upgrade("/echo", || Box::new(EchoConnection::default()) as Box<dyn ConnectionHandler>)
//!     .unwrap();
//! let (_dispatcher, bridge) = router.build();
//! assert!(bridge.is_upgrade_path("/echo"));
//! assert!(!bridge.is_upgrade_path("/echo/"));
//! ```

mod bridge;
mod connection;
mod echo;
mod handler;

pub use bridge::UpgradeBridge;
pub use connection::{Connection, ConnectionState, ABNORMAL_CLOSURE};
pub use echo::EchoConnection;
pub use handler::{ConnectionContext, ConnectionFactory, ConnectionHandler};
