//! # Server Module
//!
//! Runtime adapters between the routing core and real sockets.
//!
//! - [`AppService`] implements `may_minihttp::HttpService` and maps dispatch
//!   outcomes to status codes: handled → the handler's status, not found →
//!   404, validation failure → 400, handler failure → 500. With metrics
//!   enabled it also owns `GET /metrics`.
//! - [`HttpServer`] starts an `AppService` and returns a [`ServerHandle`].
//! - [`WsServer`] accepts WebSocket handshakes on its own listener and feeds
//!   frames into the [`UpgradeBridge`](crate::upgrade::UpgradeBridge).
//!
//! HTTP parsing and WebSocket framing happen in `may_minihttp` and
//! `tungstenite`; nothing here looks at raw bytes beyond copying them.

mod http_server;
mod request;
mod response;
mod service;
mod ws;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{forwarded_addr, parse_cookies, parse_query_params, parse_request, split_target};
pub use response::{status_reason, write_json_error, MAX_RESPONSE_HEADERS};
pub use service::{metrics_endpoint, shadows_metrics_route, AppService, METRICS_PATH};
pub use ws::WsServer;
