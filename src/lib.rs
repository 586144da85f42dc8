//! # panrouter
//!
//! **panrouter** is an embeddable HTTP routing and dispatch engine for the
//! `may` coroutine runtime. Applications declare routes with URI templates,
//! group them under path prefixes, run ordered filter chains ahead of their
//! handlers, and bridge selected paths into persistent WebSocket connections.
//!
//! ## Architecture
//!
//! - **[`template`]** - compiles `/users/{id}` style patterns and matches targets
//! - **[`router`]** - registration API: routes, filters, mounts, upgrades
//! - **[`dispatcher`]** - per-request pipeline: first-match route, filters, handler
//! - **[`upgrade`]** - exact-path upgrade bindings and per-connection lifecycle
//! - **[`session`]** - concurrent registry of live upgraded connections
//! - **[`middleware`]** - observational hooks (metrics, tracing)
//! - **[`server`]** - `may_minihttp` and `tungstenite` adapters
//! - **[`runtime_config`]** / **[`logging`]** - configuration and log setup
//!
//! ## Request Flow
//!
//! ```text
//! may_minihttp ─▶ AppService ─▶ Dispatcher ─▶ RouteTable (first match)
//!                                   │
//!                                   ├─▶ filters (prefix match, in order)
//!                                   └─▶ handler ─▶ HandlerResponse ─▶ wire
//! ```
//!
//! Registration happens once, single-threaded, on a [`router::Router`].
//! [`router::Router::build`] consumes it, so the resulting
//! [`dispatcher::Dispatcher`] is immutable and shared across coroutines as an
//! `Arc` without locking.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use panrouter::router::Router;
//! use panrouter::server::{AppService, HttpServer, WsServer};
//! use panrouter::upgrade::{ConnectionHandler, EchoConnection};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut router = Router::new();
//!     router.get("/health", |_req, res| {
//!         res.write_json(&serde_json::json!({ "status": "ok" }))?;
//!         Ok(())
//!     })?;
//!     router.upgrade("/echo", || Box::new(EchoConnection::default()) as Box<dyn ConnectionHandler>)?;
//!
//!     let (dispatcher, bridge) = router.build();
//!     let http = HttpServer(AppService::new(Arc::new(dispatcher))).start("127.0.0.1:8080")?;
//!     let _ws = WsServer::new(Arc::new(bridge)).start("127.0.0.1:8081")?;
//!     http.join().ok();
//!     Ok(())
//! }
//! ```

pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod router;
pub mod runtime_config;
pub mod server;
pub mod session;
pub mod template;
pub mod upgrade;

pub use dispatcher::{DispatchOutcome, Dispatcher, Handler, HandlerRequest, HandlerResponse};
pub use error::{DispatchError, PatternError, RegistrationError, ValidationError};
pub use router::Router;
pub use upgrade::{ConnectionContext, ConnectionHandler, UpgradeBridge};
