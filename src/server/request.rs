use http::Method;
use may_minihttp::Request;
use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::debug;

use crate::dispatcher::{HandlerRequest, HeaderVec};
use crate::error::ValidationError;
use crate::ids::RequestId;
use crate::template::ParamVec;

/// Client address as reported by a fronting proxy.
///
/// `may_minihttp` does not expose the peer socket address, so this is the
/// only source. Takes the first `x-forwarded-for` entry, else `x-real-ip`.
/// A bare IP gets port 0. Headers are expected with lowercased names.
#[must_use]
pub fn forwarded_addr(headers: &[(Arc<str>, String)]) -> Option<SocketAddr> {
    let header = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    };
    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .or_else(|| header("x-real-ip"))
        .and_then(|v| parse_addr(v.trim()))
}

fn parse_addr(raw: &str) -> Option<SocketAddr> {
    raw.parse::<SocketAddr>()
        .ok()
        .or_else(|| raw.parse::<IpAddr>().ok().map(|ip| SocketAddr::new(ip, 0)))
}

/// Split a request target into path and query string.
///
/// An empty path becomes `/`.
#[must_use]
pub fn split_target(raw: &str) -> (&str, Option<&str>) {
    let (path, query) = match raw.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (raw, None),
    };
    (if path.is_empty() { "/" } else { path }, query)
}

/// Parse a `Cookie` header value into name/value pairs.
#[must_use]
pub fn parse_cookies(header: &str) -> HeaderVec {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim();
            Some((Arc::from(name), value.to_string()))
        })
        .collect()
}

/// URL-decode a query string into name/value pairs, order preserved.
#[must_use]
pub fn parse_query_params(query: &str) -> ParamVec {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
        .collect()
}

/// Convert a `may_minihttp` request into a [`HandlerRequest`].
///
/// The body is read last because reading consumes the request.
///
/// # Errors
///
/// [`ValidationError`] when the method token is invalid or the body cannot be
/// read.
pub fn parse_request(req: Request) -> Result<HandlerRequest, ValidationError> {
    let method = Method::from_bytes(req.method().as_bytes())
        .map_err(|_| ValidationError::new(format!("invalid method '{}'", req.method())))?;
    let (path, query) = split_target(req.path());

    let headers: HeaderVec = req
        .headers()
        .iter()
        .map(|h| {
            (
                Arc::from(h.name.to_ascii_lowercase().as_str()),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();

    let mut parsed = HandlerRequest::new(method, path);
    let inbound_id = headers
        .iter()
        .find(|(k, _)| k.as_ref() == "x-request-id")
        .map(|(_, v)| v.as_str());
    parsed.request_id = RequestId::from_header_or_new(inbound_id);
    parsed.query_params = query.map(parse_query_params).unwrap_or_default();
    parsed.cookies = headers
        .iter()
        .filter(|(k, _)| k.as_ref() == "cookie")
        .flat_map(|(_, v)| parse_cookies(v))
        .collect();
    parsed.remote_addr = forwarded_addr(&headers);
    parsed.headers = headers;

    let mut body = Vec::new();
    req.body()
        .read_to_end(&mut body)
        .map_err(|e| ValidationError::new(format!("failed to read request body: {e}")))?;
    parsed.body = body;

    debug!(
        request_id = %parsed.request_id,
        method = %parsed.method,
        path = %parsed.target,
        remote_addr = ?parsed.remote_addr,
        header_count = parsed.headers.len(),
        cookie_count = parsed.cookies.len(),
        param_count = parsed.query_params.len(),
        body_size_bytes = parsed.body.len(),
        "HTTP request parsed"
    );

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_target() {
        assert_eq!(split_target("/p?x=1"), ("/p", Some("x=1")));
        assert_eq!(split_target("/p"), ("/p", None));
        assert_eq!(split_target("?x"), ("/", Some("x")));
        assert_eq!(split_target(""), ("/", None));
    }

    #[test]
    fn test_parse_cookies() {
        let cookies = parse_cookies("a=b; c=d; =skip; flag");
        let pairs: Vec<_> = cookies.iter().map(|(k, v)| (k.as_ref(), v.as_str())).collect();
        assert_eq!(pairs, [("a", "b"), ("c", "d"), ("flag", "")]);
    }

    #[test]
    fn test_parse_query_params_decodes_and_keeps_order() {
        let q = parse_query_params("x=1&name=a%20b&x=2");
        let pairs: Vec<_> = q.iter().map(|(k, v)| (k.as_ref(), v.as_str())).collect();
        assert_eq!(pairs, [("x", "1"), ("name", "a b"), ("x", "2")]);
    }

    fn headers(pairs: &[(&str, &str)]) -> Vec<(Arc<str>, String)> {
        pairs
            .iter()
            .map(|(k, v)| (Arc::from(*k), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_forwarded_addr_takes_first_hop() {
        let h = headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]);
        assert_eq!(forwarded_addr(&h), Some("203.0.113.7:0".parse().unwrap()));

        let h = headers(&[("x-forwarded-for", "[2001:db8::1]:4711")]);
        assert_eq!(forwarded_addr(&h), Some("[2001:db8::1]:4711".parse().unwrap()));
    }

    #[test]
    fn test_forwarded_addr_falls_back_to_real_ip() {
        let h = headers(&[("x-real-ip", " 198.51.100.2:8443 ")]);
        assert_eq!(forwarded_addr(&h), Some("198.51.100.2:8443".parse().unwrap()));
    }

    #[test]
    fn test_forwarded_addr_ignores_garbage_and_absence() {
        assert_eq!(forwarded_addr(&headers(&[("x-forwarded-for", "unknown")])), None);
        assert_eq!(forwarded_addr(&headers(&[("host", "example.com")])), None);
    }
}
