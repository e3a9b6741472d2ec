//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use cookie::Cookie;
use tracing::debug;

/// An incoming HTTP request with its body fully buffered.
///
/// Built by the server from hyper's request parts, or by hand in tests:
///
/// ```rust
/// use strata::Request;
///
/// let req = Request::new("GET", "/users/42?pretty")
///     .with_header("accept-encoding", "gzip");
/// assert_eq!(req.path(), "/users/42");
/// assert!(req.has_query_param("pretty"));
/// ```
#[derive(Clone, Debug)]
pub struct Request {
    method: String,
    path: String,
    query: Option<String>,
    headers: Vec<(String, String)>,
    body: Bytes,
    params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    /// A request for `target` (`path[?query]`) with no headers and no body.
    pub fn new(method: &str, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_owned())),
            None => (target, None),
        };
        Self {
            method: method.to_owned(),
            path: if path.is_empty() { "/".to_owned() } else { path.to_owned() },
            query,
            headers: Vec::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            remote_addr: None,
        }
    }

    pub(crate) fn from_parts(
        parts: http::request::Parts,
        body: Bytes,
        remote_addr: SocketAddr,
    ) -> Self {
        let target = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
        let mut req = Self::new(parts.method.as_str(), target);
        req.headers = parts.headers.iter()
            .filter_map(|(k, v)| match v.to_str() {
                Ok(v) => Some((k.as_str().to_owned(), v.to_owned())),
                Err(_) => {
                    debug!(header = %k, "dropping request header that is not visible ASCII");
                    None
                }
            })
            .collect();
        req.body = body;
        req.remote_addr = Some(remote_addr);
        req
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// The raw method token. May be a method [`Method`](crate::Method) does not know.
    pub fn method(&self) -> &str { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Client address as seen on the socket.
    pub fn ip(&self) -> Option<IpAddr> {
        self.remote_addr.map(|addr| addr.ip())
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    /// True when the query string carries `name`, with or without a value.
    pub fn has_query_param(&self, name: &str) -> bool {
        self.query.as_deref().is_some_and(|q| {
            q.split('&').any(|pair| pair.split('=').next() == Some(name))
        })
    }

    /// Value of the first cookie called `name` across all `Cookie` headers.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers.iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("cookie"))
            .flat_map(|(_, v)| Cookie::split_parse(v.as_str()).flatten())
            .find(|c| c.name() == name)
            .map(|c| c.value().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_path_and_query() {
        let req = Request::new("GET", "/a/b?x=1&pretty");
        assert_eq!(req.path(), "/a/b");
        assert_eq!(req.query(), Some("x=1&pretty"));
        assert!(req.has_query_param("x"));
        assert!(req.has_query_param("pretty"));
        assert!(!req.has_query_param("y"));
    }

    #[test]
    fn from_parts_skips_undecodable_headers() {
        let (parts, ()) = http::Request::builder()
            .method("POST")
            .uri("/upload?dry-run")
            .header("cookie", "a=1")
            .header("x-label", http::HeaderValue::from_bytes(b"caf\xe9").unwrap())
            .body(())
            .unwrap()
            .into_parts();
        let req = Request::from_parts(parts, Bytes::from_static(b"data"), "127.0.0.1:4000".parse().unwrap());

        assert_eq!(req.method(), "POST");
        assert!(req.has_query_param("dry-run"));
        assert_eq!(req.header("x-label"), None);
        assert_eq!(req.cookie("a").as_deref(), Some("1"));
        assert_eq!(req.headers().len(), 1);
        assert_eq!(req.body(), b"data");
    }

    #[test]
    fn finds_cookies_across_headers() {
        let req = Request::new("GET", "/")
            .with_header("Cookie", "a=1; b=2")
            .with_header("cookie", "c=3");
        assert_eq!(req.cookie("b").as_deref(), Some("2"));
        assert_eq!(req.cookie("c").as_deref(), Some("3"));
        assert_eq!(req.cookie("d"), None);
    }
}
