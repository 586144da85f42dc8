use serde::Serialize;
use std::sync::Arc;

use super::request::HeaderVec;

/// Mutable response view shared by the filters and the handler of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerResponse {
    /// HTTP status code
    pub status: u16,
    /// HTTP response headers
    pub headers: HeaderVec,
    /// Response body
    pub body: Vec<u8>,
}

impl Default for HandlerResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HeaderVec::new(),
            body: Vec::new(),
        }
    }
}

impl HandlerResponse {
    /// An empty `200` response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header (names compare case-insensitively).
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value.into()));
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.set_header("content-type", content_type);
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// Append text to the body.
    pub fn write_str(&mut self, text: &str) {
        self.body.extend_from_slice(text.as_bytes());
    }

    /// Replace the body with `value` serialized as JSON and set the content type.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `value` cannot be represented as JSON.
    pub fn write_json<T: Serialize>(&mut self, value: &T) -> Result<(), serde_json::Error> {
        self.body = serde_json::to_vec(value)?;
        self.set_content_type("application/json");
        Ok(())
    }

    /// Body as text, lossy.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Discard everything written so far.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
