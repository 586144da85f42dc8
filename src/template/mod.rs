//! # Template Module
//!
//! Compiles route patterns such as `/users/{id}/posts/{post_id}` into
//! segment templates and matches request targets against them.
//!
//! ## Matching Rules
//!
//! - Patterns and targets are split on `/`; empty segments are discarded, so
//!   repeated and trailing slashes never matter (`/a/` ≡ `/a` ≡ `//a`).
//! - A target matches when it has exactly as many segments as the pattern.
//!   There are no wildcard or greedy segments.
//! - A `{name}` segment captures the corresponding target segment; any other
//!   segment must be equal to it byte for byte (case-sensitive).
//!
//! ## Example
//!
//! ```rust
//! use panrouter::template::PathTemplate;
//!
//! let t = PathTemplate::compile("/users/{id}/posts/{post_id}").unwrap();
//! assert!(t.matches("/users/7/posts/abc/"));
//! let params = t.extract("/users/7/posts/abc");
//! assert_eq!(params[0].1, "7");
//! assert_eq!(params[1].1, "abc");
//! ```

mod core;

pub use core::{normalize, ParamVec, PathTemplate, Segment, MAX_INLINE_PARAMS};
