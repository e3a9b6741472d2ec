//! Error types.
//!
//! Two layers, two types:
//!
//! - [`Error`] surfaces infrastructure failures: binding a port, reading
//!   configuration, reaching a store at startup. These end up in `main`.
//! - [`HttpError`] is the per-request error record. Units and handlers
//!   return it through [`Next`](crate::middleware::Next); the
//!   [`ErrorBoundary`](crate::middleware::ErrorBoundary) turns it into
//!   exactly one response.

use std::any::Any;
use std::fmt::{self, Write as _};
use std::net::SocketAddr;
use std::panic::Location;

use thiserror::Error;

use crate::status::{self, Status};
use crate::store::StoreError;

/// The error type returned by strata's fallible infrastructure operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration for `{key}`: {reason}")]
    Config { key: String, reason: String },

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("request aborted by client")]
    Aborted,
}

/// Client fault (4xx) or server fault (5xx).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Client,
    Server,
}

/// Not IANA-registered; the nginx convention for a client that went away.
pub(crate) const CLIENT_CLOSED_REQUEST: u16 = 499;

type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A request-level failure.
///
/// The `message` is considered safe to show to clients. Anything diagnostic
/// belongs in the `cause`, which only reaches the response body through the
/// `stack` field of server faults outside production.
///
/// Constructors are `#[track_caller]`: the error remembers where it was
/// raised, and that location heads the diagnostic stack.
///
/// ```rust
/// use strata::{ErrorKind, HttpError, Status};
///
/// let err = HttpError::new(Status::TooManyRequests, "slow down")
///     .with_header("retry-after", "30");
/// assert_eq!(err.kind(), ErrorKind::Client);
/// assert_eq!(err.name(), "TooManyRequestsError");
/// ```
#[derive(Debug)]
pub struct HttpError {
    status: u16,
    message: String,
    headers: Vec<(String, String)>,
    cause: Option<Cause>,
    location: &'static Location<'static>,
}

impl HttpError {
    /// Error with an explicit status and safe message.
    ///
    /// Statuses outside 400..=599 are normalized to 500: an error that is
    /// not an error status is a bug in the raiser.
    #[track_caller]
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self::with_code(status.code(), message)
    }

    /// Error whose message is the status reason phrase (`"Not Found"`).
    #[track_caller]
    pub fn from_status(status: Status) -> Self {
        Self::new(status, status.reason())
    }

    /// `500` wrapping an internal failure. The cause stays out of the message.
    #[track_caller]
    pub fn internal(cause: impl Into<Cause>) -> Self {
        Self::from_status(Status::InternalServerError).with_cause(cause)
    }

    #[track_caller]
    pub(crate) fn with_code(code: u16, message: impl Into<String>) -> Self {
        let status = if (400..=599).contains(&code) { code } else { 500 };
        Self {
            status,
            message: message.into(),
            headers: Vec::new(),
            cause: None,
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub(crate) fn aborted() -> Self {
        Self::with_code(CLIENT_CLOSED_REQUEST, "client closed request")
    }

    #[track_caller]
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::internal(Panicked(detail))
    }

    /// Attaches the underlying failure.
    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Adds a header the boundary writes alongside the error response.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_owned(), value.into()));
        self
    }

    /// Replaces the safe message, keeping status, cause and headers.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn status(&self) -> u16 { self.status }
    pub fn message(&self) -> &str { &self.message }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn location(&self) -> &'static Location<'static> { self.location }

    pub fn kind(&self) -> ErrorKind {
        if self.status < 500 { ErrorKind::Client } else { ErrorKind::Server }
    }

    /// Class-style name derived from the reason phrase:
    /// `404` → `NotFoundError`, `500` → `InternalServerError`.
    pub fn name(&self) -> String {
        let mut name: String = status::reason(self.status)
            .split(|c: char| !c.is_ascii_alphanumeric())
            .collect();
        if name.is_empty() {
            return "HttpError".to_owned();
        }
        if !name.ends_with("Error") {
            name.push_str("Error");
        }
        name
    }

    /// Diagnostic trace: name, message, raise location, then the cause chain.
    pub fn stack(&self) -> String {
        let mut out = format!("{}: {}\n    at {}", self.name(), self.message, self.location);
        let mut source = self
            .cause
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static));
        while let Some(err) = source {
            let _ = write!(out, "\ncaused by: {err}");
            source = err.source();
        }
        out
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<StoreError> for HttpError {
    #[track_caller]
    fn from(e: StoreError) -> Self {
        Self::internal(e)
    }
}

/// Payload of a panic caught inside the pipeline.
#[derive(Debug, Error)]
#[error("panicked: {0}")]
struct Panicked(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_error_status_normalizes_to_500() {
        let err = HttpError::new(Status::Ok, "fine");
        assert_eq!(err.status(), 500);
        assert_eq!(err.kind(), ErrorKind::Server);
    }

    #[test]
    fn names_follow_reason_phrase() {
        assert_eq!(HttpError::from_status(Status::NotFound).name(), "NotFoundError");
        assert_eq!(HttpError::from_status(Status::InternalServerError).name(), "InternalServerError");
        assert_eq!(HttpError::aborted().name(), "HttpError");
    }

    #[test]
    fn stack_lists_location_and_causes() {
        let io = std::io::Error::other("disk on fire");
        let err = HttpError::internal(io);
        let stack = err.stack();
        assert!(stack.starts_with("InternalServerError: Internal Server Error\n    at "));
        assert!(stack.contains(file!()));
        assert!(stack.ends_with("caused by: disk on fire"));
    }

    #[test]
    fn panic_payload_becomes_cause() {
        let err = HttpError::from_panic(Box::new("boom"));
        assert_eq!(err.status(), 500);
        assert_eq!(err.message(), "Internal Server Error");
        assert!(err.stack().contains("panicked: boom"));
    }
}
