//! Conditional GET: answer `304 Not Modified` to fresh requests.
//!
//! Runs its check after downstream has produced the response, so an
//! [`Etag`](super::Etag) unit must sit *downstream* of this one for the
//! `ETag` header to exist by then.

use std::time::SystemTime;

use super::{BoxFuture, Middleware, Next, Outcome};
use crate::context::Context;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

#[derive(Clone, Copy, Debug, Default)]
pub struct ConditionalGet;

impl ConditionalGet {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for ConditionalGet {
    fn name(&self) -> &'static str { "conditional-get" }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            next.run(ctx).await?;
            if is_fresh(ctx.request(), ctx.response()) {
                let res = ctx.response_mut();
                res.set_status(Status::NotModified);
                res.clear_body();
            }
            Ok(())
        })
    }
}

/// Whether the client's cached copy is still valid for this response.
pub(crate) fn is_fresh(req: &Request, res: &Response) -> bool {
    if !matches!(req.method(), "GET" | "HEAD") {
        return false;
    }
    let status = res.status();
    if !((200..300).contains(&status) || status == 304) {
        return false;
    }

    let none_match = req.header("if-none-match");
    let modified_since = req.header("if-modified-since");
    if none_match.is_none() && modified_since.is_none() {
        return false;
    }
    if req.header("cache-control").is_some_and(|cc| cc.to_ascii_lowercase().contains("no-cache")) {
        return false;
    }

    if let Some(none_match) = none_match.map(str::trim) {
        if none_match != "*" {
            let Some(etag) = res.header("etag") else { return false };
            let etag = strip_weak(etag);
            if !none_match.split(',').any(|candidate| strip_weak(candidate.trim()) == etag) {
                return false;
            }
        }
    }

    if let Some(since) = modified_since {
        let last = res.header("last-modified").and_then(|v| httpdate::parse_http_date(v).ok());
        let since = httpdate::parse_http_date(since).ok();
        match (last, since) {
            (Some(last), Some(since)) => return not_after(last, since),
            _ => return false,
        }
    }
    true
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

fn not_after(last_modified: SystemTime, since: SystemTime) -> bool {
    last_modified <= since
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(etag: &str) -> Response {
        let mut res = Response::new();
        res.set_text("hello");
        res.set_header("etag", etag);
        res
    }

    #[test]
    fn matching_etag_is_fresh() {
        let req = Request::new("GET", "/").with_header("if-none-match", "\"a\", W/\"b\"");
        assert!(is_fresh(&req, &response_with("\"b\"")));
        assert!(!is_fresh(&req, &response_with("\"c\"")));
    }

    #[test]
    fn wildcard_and_no_cache() {
        let req = Request::new("GET", "/").with_header("if-none-match", "*");
        assert!(is_fresh(&req, &response_with("\"x\"")));
        let req = req.with_header("cache-control", "no-cache");
        assert!(!is_fresh(&req, &response_with("\"x\"")));
    }

    #[test]
    fn only_safe_methods_and_success_statuses() {
        let req = Request::new("POST", "/").with_header("if-none-match", "\"a\"");
        assert!(!is_fresh(&req, &response_with("\"a\"")));

        let req = Request::new("GET", "/").with_header("if-none-match", "\"a\"");
        let mut res = response_with("\"a\"");
        res.set_status(Status::InternalServerError);
        assert!(!is_fresh(&req, &res));
    }

    #[test]
    fn last_modified_comparison() {
        let req = Request::new("GET", "/")
            .with_header("if-modified-since", "Wed, 21 Oct 2015 07:28:00 GMT");
        let mut res = Response::new();
        res.set_text("x");
        res.set_header("last-modified", "Tue, 20 Oct 2015 07:28:00 GMT");
        assert!(is_fresh(&req, &res));
        res.set_header("last-modified", "Thu, 22 Oct 2015 07:28:00 GMT");
        assert!(!is_fresh(&req, &res));
    }
}
