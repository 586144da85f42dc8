//! # Middleware Module
//!
//! Observational hooks around every dispatch. Middleware sees each request
//! before routing and the final [`DispatchResult`](crate::dispatcher::DispatchResult)
//! afterwards, including not-found and failed requests. It cannot veto or
//! rewrite a request; that is what filters are for.
//!
//! ## Available Middleware
//!
//! - [`MetricsMiddleware`] - request, outcome and latency counters with a
//!   Prometheus text rendering
//! - [`TracingMiddleware`] - one structured event per request
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use panrouter::middleware::MetricsMiddleware;
//! use panrouter::router::Router;
//!
//! let (mut dispatcher, _bridge) = Router::new().build();
//! let metrics = Arc::new(MetricsMiddleware::new());
//! dispatcher.add_middleware(metrics.clone());
//! ```

mod core;
mod metrics;
mod tracing;

pub use core::Middleware;
pub use metrics::MetricsMiddleware;
pub use tracing::TracingMiddleware;
