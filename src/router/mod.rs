//! # Router Module
//!
//! The router is the registration surface of panrouter. Routes, filters and
//! upgrade endpoints are declared on a [`Router`] at startup; calling
//! [`Router::build`] freezes them into a [`Dispatcher`](crate::dispatcher::Dispatcher)
//! and an [`UpgradeBridge`](crate::upgrade::UpgradeBridge).
//!
//! ## Mounting
//!
//! [`Router::mount`] pushes a path fragment onto a [`ContextStack`] for the
//! duration of a closure. Everything registered inside the closure, including
//! nested mounts, is prefixed with the fragments currently on the stack:
//!
//! ```rust
//! use panrouter::dispatcher::{HandlerRequest, HandlerResponse};
//! use panrouter::router::Router;
//!
//! fn ok(_: &mut HandlerRequest, _: &mut HandlerResponse) -> anyhow::Result<()> {
//!     Ok(())
//! }
//!
//! let mut router = Router::new();
//! router
//!     .mount("/api", |api| {
//!         api.get("/x", ok)?;
//!         api.mount("/v1", |v1| {
//!             v1.post("/users/{id}", ok)?;
//!             Ok(())
//!         })?;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let patterns: Vec<_> = router.table().routes().iter().map(|r| r.template().pattern()).collect();
//! assert_eq!(patterns, ["/api/x", "/api/v1/users/{id}"]);
//! ```
//!
//! ## Precedence
//!
//! Routes are matched in registration order and the first match wins.
//! Registering the same method and pattern twice is allowed; the later route is
//! simply unreachable. Registration order is therefore part of the observable
//! behavior of an application.

mod context;
mod core;
#[cfg(test)]
mod tests;

pub use context::ContextStack;
pub use core::{FilterRule, Route, RouteTable, Router, SUPPORTED_METHODS};
