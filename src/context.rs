//! Per-request context.
//!
//! One [`Context`] exists per inbound request. The pipeline owns it; units
//! and handlers borrow it mutably, one at a time, in onion order. It is never
//! shared between requests and needs no synchronisation.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::middleware::Session;
use crate::request::Request;
use crate::response::Response;

/// Everything a unit can see or change about one request.
///
/// ```rust
/// use strata::{Context, Request};
/// use serde_json::json;
///
/// let mut ctx = Context::new(Request::new("GET", "/"));
/// ctx.state_mut().insert("user".into(), json!("alice"));
/// ctx.response_mut().set_text("hi");
/// assert_eq!(ctx.response().status(), 200);
/// ```
#[derive(Debug)]
pub struct Context {
    request: Request,
    response: Response,
    state: HashMap<String, Value>,
    session: Option<Session>,
    cancellation: CancellationToken,
    started_at: Instant,
    /// Set once the error boundary has written an error response.
    pub(crate) error_handled: bool,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self::with_cancellation(request, CancellationToken::new())
    }

    /// Context whose pipeline stops when `token` is cancelled.
    pub fn with_cancellation(request: Request, token: CancellationToken) -> Self {
        Self {
            request,
            response: Response::new(),
            state: HashMap::new(),
            session: None,
            cancellation: token,
            started_at: Instant::now(),
            error_handled: false,
        }
    }

    pub fn request(&self) -> &Request { &self.request }
    pub fn request_mut(&mut self) -> &mut Request { &mut self.request }
    pub fn response(&self) -> &Response { &self.response }
    pub fn response_mut(&mut self) -> &mut Response { &mut self.response }

    /// Request-scoped key/value state shared by units and the handler.
    pub fn state(&self) -> &HashMap<String, Value> { &self.state }
    pub fn state_mut(&mut self) -> &mut HashMap<String, Value> { &mut self.state }

    /// The request's session; `None` unless [`Sessions`](crate::middleware::Sessions) runs upstream.
    pub fn session(&self) -> Option<&Session> { self.session.as_ref() }
    pub fn session_mut(&mut self) -> Option<&mut Session> { self.session.as_mut() }

    pub(crate) fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    pub(crate) fn take_session(&mut self) -> Option<Session> {
        self.session.take()
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.request.ip()
    }

    pub fn cancellation(&self) -> &CancellationToken { &self.cancellation }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Whether an error response has already been formatted for this request.
    pub fn error_handled(&self) -> bool {
        self.error_handled
    }

    pub fn into_response(self) -> Response {
        self.response
    }
}
