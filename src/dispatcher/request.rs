use http::Method;
use serde::de::DeserializeOwned;
use smallvec::SmallVec;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::ValidationError;
use crate::ids::RequestId;
use crate::template::ParamVec;

/// Maximum inline headers/cookies before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header/cookie storage.
///
/// Header names are lowercased by the server adapter; lookups are
/// case-insensitive anyway.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Read-mostly view of one HTTP request.
///
/// Everything except `attributes` is filled in by the server boundary.
/// Attributes are request-scoped name/value pairs: the dispatcher stores the
/// captured path parameters there, and filters may add their own for the
/// handler to consume.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    /// Unique request ID for tracing and correlation
    pub request_id: RequestId,
    /// HTTP method
    pub method: Method,
    /// Request path as received, without the query string
    pub target: String,
    /// Query string parameters
    pub query_params: ParamVec,
    /// HTTP headers
    pub headers: HeaderVec,
    /// Cookies parsed from the Cookie header
    pub cookies: HeaderVec,
    /// Raw request body
    pub body: Vec<u8>,
    /// Peer address, when the runtime exposes it
    pub remote_addr: Option<SocketAddr>,
    attributes: ParamVec,
}

impl HandlerRequest {
    #[must_use]
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            method,
            target: target.into(),
            query_params: ParamVec::new(),
            headers: HeaderVec::new(),
            cookies: HeaderVec::new(),
            body: Vec::new(),
            remote_addr: None,
            attributes: ParamVec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .push((Arc::from(name.to_ascii_lowercase().as_str()), value.into()));
        self
    }

    #[must_use]
    pub fn with_cookie(mut self, name: &str, value: impl Into<String>) -> Self {
        self.cookies.push((Arc::from(name), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    #[must_use]
    pub fn get_cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get a query parameter by name; the last occurrence wins.
    #[inline]
    #[must_use]
    pub fn get_query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get a request attribute; the last write wins.
    #[inline]
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// All attributes in the order they were set.
    #[must_use]
    pub fn attributes(&self) -> &ParamVec {
        &self.attributes
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        self.attributes.push((Arc::from(name), value.into()));
    }

    pub(crate) fn extend_attributes(&mut self, params: ParamVec) {
        self.attributes.extend(params);
    }

    /// The body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// [`ValidationError`] when the body is not valid UTF-8.
    pub fn body_text(&self) -> Result<&str, ValidationError> {
        std::str::from_utf8(&self.body)
            .map_err(|e| ValidationError::new(format!("request body is not UTF-8: {e}")))
    }

    /// Deserialize the body as JSON.
    ///
    /// # Errors
    ///
    /// [`ValidationError`] when the body is empty or is not valid JSON for `T`.
    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, ValidationError> {
        if self.body.is_empty() {
            return Err(ValidationError::new("request body is empty"));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| ValidationError::new(format!("malformed JSON body: {e}")))
    }
}
