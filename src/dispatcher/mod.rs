//! # Dispatcher Module
//!
//! The dispatcher is the single entry point invoked for every HTTP request.
//! It owns the immutable route table produced by
//! [`Router::build`](crate::router::Router::build) and walks it without any
//! locking, so one `Arc<Dispatcher>` can be shared by every server worker.
//!
//! ## Request Flow
//!
//! ```text
//! MATCHING ──no route──▶ NOT_FOUND
//!    │
//!    ▼ first route whose method and template match
//! FILTERING  (every filter whose prefix starts the target, in order)
//!    │
//!    ▼
//! HANDLING   (the selected route's handler)
//!    │
//!    ▼
//!  DONE
//! ```
//!
//! 1. Routes are scanned in registration order; the first match wins.
//! 2. Captured path parameters become request attributes before any filter
//!    runs, so filters and the handler can both read them.
//! 3. Filters cannot veto the handler. They can only write to the response
//!    or fail.
//! 4. A failure in a filter or handler aborts the rest of the pipeline, resets
//!    the response and is returned as a [`DispatchError`](crate::error::DispatchError).
//!
//! ## Handlers
//!
//! ```rust
//! use panrouter::dispatcher::{HandlerRequest, HandlerResponse};
//! use panrouter::router::Router;
//!
//! let mut router = Router::new();
//! router
//!     .get("/pets/{id}", |req: &mut HandlerRequest, res: &mut HandlerResponse| {
//!         let id = req.attribute("id").unwrap_or_default().to_string();
//!         res.write_json(&serde_json::json!({ "id": id }))?;
//!         Ok(())
//!     })
//!     .unwrap();
//! let (dispatcher, _bridge) = router.build();
//!
//! let mut req = HandlerRequest::new(http::Method::GET, "/pets/42");
//! let mut res = HandlerResponse::new();
//! dispatcher.dispatch(&mut req, &mut res).unwrap();
//! assert_eq!(res.body_text(), r#"{"id":"42"}"#);
//! ```

mod core;
mod request;
mod response;

pub use core::{DispatchOutcome, DispatchResult, Dispatcher, Handler, Phase, SharedHandler};
pub use request::{HandlerRequest, HeaderVec, MAX_INLINE_HEADERS};
pub use response::HandlerResponse;
