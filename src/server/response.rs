use may_minihttp::Response;
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::dispatcher::HandlerResponse;

/// Header lines `may_minihttp` can carry on one response, on top of the
/// `Server`, `Date` and `Content-Length` lines it writes itself.
pub const MAX_RESPONSE_HEADERS: usize = 16;

const DEFAULT_CONTENT_TYPE: &str = "Content-Type: text/plain; charset=utf-8";

/// Literal lines for the content types this crate writes itself.
fn static_line(name: &str, value: &str) -> Option<&'static str> {
    if !name.eq_ignore_ascii_case("content-type") {
        return None;
    }
    match value {
        "text/plain; charset=utf-8" => Some(DEFAULT_CONTENT_TYPE),
        "application/json" => Some("Content-Type: application/json"),
        "text/plain; version=0.0.4" => Some("Content-Type: text/plain; version=0.0.4"),
        "text/html; charset=utf-8" => Some("Content-Type: text/html; charset=utf-8"),
        _ => None,
    }
}

/// Owned storage for the header lines of the response being written.
///
/// `may_minihttp` takes header lines as `&'static str` but encodes each
/// response before it calls the service again. The service that owns this
/// arena clears it at the start of every request, so a connection holds at
/// most one response worth of lines.
#[derive(Default)]
pub(crate) struct HeaderLines {
    lines: Vec<Box<str>>,
}

impl Clone for HeaderLines {
    // Clones serve other connections and start empty.
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl HeaderLines {
    pub(crate) fn clear(&mut self) {
        self.lines.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lines.len()
    }

    /// Format `name: value` and hand out a line for `Response::header`.
    ///
    /// # Safety
    ///
    /// The returned reference is only valid until the next
    /// [`HeaderLines::clear`] or until `self` is dropped.
    unsafe fn line(&mut self, name: &str, value: &str) -> &'static str {
        if let Some(line) = static_line(name, value) {
            return line;
        }
        let line = format!("{name}: {value}").into_boxed_str();
        let ptr: *const str = &*line;
        self.lines.push(line);
        // SAFETY: the boxed str's heap data does not move when the Vec
        // grows, and the caller bounds how long the reference is used.
        unsafe { &*ptr }
    }
}

#[must_use]
pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Header lines `hr` will put on the wire, default content type included.
///
/// Headers whose name or value contains a line break are left out.
fn wire_headers(hr: &HandlerResponse) -> (Vec<(&str, &str)>, bool) {
    let headers: Vec<(&str, &str)> = hr
        .headers
        .iter()
        .filter(|(name, value)| {
            let broken = name.contains(['\r', '\n']) || value.contains(['\r', '\n']);
            if broken {
                warn!(header = %name, "Dropping response header with line break");
            }
            !broken
        })
        .map(|(name, value)| (&**name, value.as_str()))
        .collect();
    let default_content_type = hr.get_header("content-type").is_none() && !hr.body.is_empty();
    (headers, default_content_type)
}

/// Copy a handler's response onto the wire.
///
/// A response with more than [`MAX_RESPONSE_HEADERS`] header lines cannot
/// be encoded and is replaced by a 500.
///
/// # Safety
///
/// `res` must be encoded before `lines` is cleared or dropped.
pub(crate) unsafe fn write_handler_response(
    res: &mut Response,
    hr: HandlerResponse,
    lines: &mut HeaderLines,
) {
    let (headers, default_content_type) = wire_headers(&hr);
    let count = headers.len() + usize::from(default_content_type);
    if count > MAX_RESPONSE_HEADERS {
        error!(
            status = hr.status,
            header_count = count,
            max = MAX_RESPONSE_HEADERS,
            "Response carries too many headers"
        );
        write_json_error(res, 500, json!({ "error": "Internal Server Error" }));
        return;
    }

    res.status_code(usize::from(hr.status), status_reason(hr.status));
    for (name, value) in headers {
        // SAFETY: forwarded from this function's contract.
        res.header(unsafe { lines.line(name, value) });
    }
    if default_content_type {
        res.header(DEFAULT_CONTENT_TYPE);
    }
    res.body_vec(hr.body);
}

pub fn write_json_error(res: &mut Response, status: u16, body: Value) {
    res.status_code(usize::from(status), status_reason(status));
    res.header("Content-Type: application/json");
    res.body_vec(body.to_string().into_bytes());
}
