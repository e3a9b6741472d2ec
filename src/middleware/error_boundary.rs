//! The error boundary: the one place that writes error responses.
//!
//! The pipeline installs it outermost. Errors raised anywhere below (by a
//! unit, by a handler, by a panic caught in [`Next`]) climb back up through
//! every post-phase, where units may inspect, replace or swallow them.
//! Whatever is still an error at the top lands here and becomes a JSON body:
//!
//! ```json
//! { "name": "NotFoundError", "message": "Not Found", "status": 404 }
//! ```
//!
//! Server faults also carry a `stack` field with the raise location and the
//! cause chain, except in [`Mode::Production`](crate::config::Mode).

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use super::{BoxFuture, Middleware, Next, Outcome};
use crate::config::Mode;
use crate::context::Context;
use crate::error::{ErrorKind, HttpError};

/// Runs before formatting. May enrich or replace the error, or forward it
/// to an alerting service; the returned error is what gets formatted.
pub type PreFormat = Arc<dyn Fn(&Context, HttpError) -> HttpError + Send + Sync>;

/// Runs over the formatted body before it is written.
pub type PostFormat =
    Arc<dyn Fn(&HttpError, Map<String, Value>) -> Map<String, Value> + Send + Sync>;

/// Entity headers describing a body the error response replaces.
const STALE_HEADERS: [&str; 5] =
    ["content-type", "content-length", "content-encoding", "etag", "last-modified"];

/// Converts any error escaping the chain into exactly one response.
#[derive(Clone, Default)]
pub struct ErrorBoundary {
    mode: Mode,
    pre_format: Option<PreFormat>,
    post_format: Option<PostFormat>,
}

impl std::fmt::Debug for ErrorBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorBoundary")
            .field("mode", &self.mode)
            .field("pre_format", &self.pre_format.is_some())
            .field("post_format", &self.post_format.is_some())
            .finish()
    }
}

impl ErrorBoundary {
    pub fn new(mode: Mode) -> Self {
        Self { mode, ..Self::default() }
    }

    pub fn pre_format<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context, HttpError) -> HttpError + Send + Sync + 'static,
    {
        self.pre_format = Some(Arc::new(hook));
        self
    }

    pub fn post_format<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HttpError, Map<String, Value>) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.post_format = Some(Arc::new(hook));
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Writes `err` as the response, unless an error response was already
    /// written for this request.
    pub(crate) fn respond(&self, ctx: &mut Context, err: HttpError) {
        if ctx.error_handled {
            debug!(status = err.status(), "error already formatted, ignoring");
            return;
        }
        ctx.error_handled = true;

        match err.kind() {
            ErrorKind::Server => error!(
                status = err.status(),
                path = ctx.request().path(),
                location = %err.location(),
                "{}", err.stack(),
            ),
            ErrorKind::Client => warn!(
                status = err.status(),
                path = ctx.request().path(),
                "{}", err.message(),
            ),
        }

        let err = match &self.pre_format {
            Some(hook) => hook(ctx, err),
            None => err,
        };

        let mut body = format_error(&err);
        if let Some(hook) = &self.post_format {
            body = hook(&err, body);
        }
        if self.mode.is_production() {
            body.remove("stack");
        }

        let res = ctx.response_mut();
        for name in STALE_HEADERS {
            res.remove_header(name);
        }
        for (name, value) in err.headers() {
            res.set_header(name, value.as_str());
        }
        res.set_status_code(err.status());
        res.set_json(Value::Object(body));
    }
}

/// `{ name, message, status }`, plus `stack` for server faults.
fn format_error(err: &HttpError) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("name".into(), err.name().into());
    body.insert("message".into(), err.message().into());
    body.insert("status".into(), err.status().into());
    if err.kind() == ErrorKind::Server {
        body.insert("stack".into(), err.stack().into());
    }
    body
}

impl Middleware for ErrorBoundary {
    fn name(&self) -> &'static str { "error-boundary" }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            match next.run(ctx).await {
                Ok(()) => Ok(()),
                // Nobody is listening any more; the executor discards the request.
                Err(err) if ctx.is_cancelled() => Err(err),
                Err(err) => {
                    self.respond(ctx, err);
                    Ok(())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::status::Status;

    fn body_of(ctx: &Context) -> Value {
        match ctx.response().body() {
            crate::response::Body::Json(v) => v.clone(),
            other => panic!("expected json body, got {other:?}"),
        }
    }

    #[test]
    fn client_errors_carry_no_stack() {
        let boundary = ErrorBoundary::new(Mode::Development);
        let mut ctx = Context::new(Request::new("GET", "/"));
        boundary.respond(&mut ctx, HttpError::new(Status::BadRequest, "missing id"));

        let body = body_of(&ctx);
        assert_eq!(ctx.response().status(), 400);
        assert_eq!(body["message"], "missing id");
        assert_eq!(body["name"], "BadRequestError");
        assert!(body.get("stack").is_none());
    }

    #[test]
    fn production_strips_stack_even_after_post_format() {
        let boundary = ErrorBoundary::new(Mode::Production)
            .post_format(|_, mut body| {
                body.insert("stack".into(), "re-added".into());
                body
            });
        let mut ctx = Context::new(Request::new("GET", "/"));
        boundary.respond(&mut ctx, HttpError::internal(std::io::Error::other("db down")));

        let body = body_of(&ctx);
        assert_eq!(ctx.response().status(), 500);
        assert!(body.get("stack").is_none());
    }

    #[test]
    fn pre_format_sees_error_before_formatting() {
        let boundary = ErrorBoundary::new(Mode::Development)
            .pre_format(|ctx, err| err.with_message(format!("{} at {}", "oops", ctx.request().path())));
        let mut ctx = Context::new(Request::new("GET", "/x"));
        boundary.respond(&mut ctx, HttpError::from_status(Status::Conflict));
        assert_eq!(body_of(&ctx)["message"], "oops at /x");
    }

    #[test]
    fn formats_once() {
        let boundary = ErrorBoundary::new(Mode::Development);
        let mut ctx = Context::new(Request::new("GET", "/"));
        boundary.respond(&mut ctx, HttpError::from_status(Status::NotFound));
        boundary.respond(&mut ctx, HttpError::from_status(Status::BadGateway));
        assert_eq!(ctx.response().status(), 404);
    }

    #[test]
    fn stale_entity_headers_are_replaced() {
        let boundary = ErrorBoundary::new(Mode::Development);
        let mut ctx = Context::new(Request::new("GET", "/"));
        ctx.response_mut().set_header("etag", "\"abc\"");
        ctx.response_mut().set_header("x-response-time", "3ms");
        boundary.respond(
            &mut ctx,
            HttpError::from_status(Status::TooManyRequests).with_header("retry-after", "9"),
        );
        let res = ctx.response();
        assert_eq!(res.header("etag"), None);
        assert_eq!(res.header("x-response-time"), Some("3ms"));
        assert_eq!(res.header("retry-after"), Some("9"));
        assert_eq!(res.content_type(), Some("application/json; charset=utf-8"));
    }
}
