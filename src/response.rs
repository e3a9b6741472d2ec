//! The mutable response descriptor every unit reads and writes.
//!
//! Handlers set a body; units downstream of the handler rewrite it on the
//! way out (render JSON, compress, answer 304). Nothing touches the wire
//! until [`Response::into_http`] runs after the pipeline has finished.

use std::borrow::Cow;

use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;
use serde_json::Value;
use tracing::warn;

use crate::status::Status;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`Response::set_bytes`].
#[derive(Clone, Copy, Debug)]
pub enum ContentType {
    Css,          // text/css; charset=utf-8
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    Html,         // text/html; charset=utf-8
    Json,         // application/json; charset=utf-8
    OctetStream,  // application/octet-stream  (binary / file download)
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Css         => "text/css; charset=utf-8",
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json; charset=utf-8",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// Response payload.
///
/// JSON stays a [`Value`] until something needs bytes, so a rendering unit
/// upstream can still decide how to print it.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    Json(Value),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Bytes(b) => b.is_empty(),
            Self::Json(_) => false,
        }
    }

    /// Wire bytes; JSON is rendered compactly.
    pub fn to_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Self::Empty => Cow::Borrowed(&[]),
            Self::Bytes(b) => Cow::Borrowed(b),
            Self::Json(v) => Cow::Owned(serde_json::to_vec(v).unwrap_or_default()),
        }
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

/// An outgoing HTTP response, under construction.
///
/// Status starts at `404` and flips to `200` the first time a body is set,
/// unless a status was set explicitly. A request nobody answered therefore
/// reads as "not found", never as an empty success.
///
/// ```rust
/// use strata::{Response, Status};
/// use serde_json::json;
///
/// let mut res = Response::new();
/// assert_eq!(res.status(), 404);
///
/// res.set_json(json!({ "id": 42 }));
/// assert_eq!(res.status(), 200);
///
/// res.set_status(Status::Created);
/// res.set_header("location", "/users/42");
/// assert_eq!(res.header("Location"), Some("/users/42"));
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    status: u16,
    explicit_status: bool,
    headers: Vec<(String, String)>,
    body: Body,
}

impl Default for Response {
    fn default() -> Self { Self::new() }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: Status::NotFound.code(),
            explicit_status: false,
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn status(&self) -> u16 { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &Body { &self.body }

    pub fn set_status(&mut self, status: Status) {
        self.set_status_code(status.code());
    }

    pub fn set_status_code(&mut self, code: u16) {
        self.status = code;
        self.explicit_status = true;
    }

    // ── headers ──────────────────────────────────────────────────────────────

    /// Case-insensitive lookup of the first value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replaces every existing value of `name`.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.remove_header(name);
        self.headers.push((name.to_owned(), value.into()));
    }

    /// Adds a value, keeping existing ones (`Set-Cookie`, `Vary`).
    pub fn append_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((name.to_owned(), value.into()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    // ── body ─────────────────────────────────────────────────────────────────

    pub fn set_json(&mut self, value: Value) {
        self.set_header("content-type", ContentType::Json.as_str());
        self.replace_body(Body::Json(value));
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.set_bytes(ContentType::Text, text.into().into_bytes());
    }

    pub fn set_bytes(&mut self, content_type: ContentType, bytes: Vec<u8>) {
        self.set_header("content-type", content_type.as_str());
        self.replace_body(Body::Bytes(bytes));
    }

    /// Swaps the payload, leaving headers alone (compression, 304).
    pub fn replace_body(&mut self, body: Body) {
        if !self.explicit_status {
            self.status = Status::Ok.code();
        }
        self.body = body;
    }

    /// Drops the payload and its entity headers.
    pub fn clear_body(&mut self) {
        self.body = Body::Empty;
        for name in ["content-type", "content-length", "content-encoding", "transfer-encoding"] {
            self.remove_header(name);
        }
    }

    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    // ── wire ─────────────────────────────────────────────────────────────────

    /// Converts into the hyper-facing response. Headers that are not valid
    /// HTTP are dropped with a warning rather than failing the request.
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let bytes = match self.body {
            Body::Empty => Bytes::new(),
            Body::Bytes(b) => Bytes::from(b),
            Body::Json(v) => Bytes::from(serde_json::to_vec(&v).unwrap_or_default()),
        };
        let mut res = http::Response::new(Full::new(bytes));
        *res.status_mut() =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        for (name, value) in self.headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
                (Ok(name), Ok(value)) => { res.headers_mut().append(name, value); }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
        res
    }
}
