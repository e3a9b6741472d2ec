//! Per-client request quotas.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use super::{BoxFuture, Middleware, Next, Outcome};
use crate::context::Context;
use crate::error::HttpError;
use crate::status::Status;
use crate::store::RateLimitStore;

/// Derives the identity to count against; `None` exempts the request.
pub type IdExtractor = Arc<dyn Fn(&Context) -> Option<String> + Send + Sync>;

pub type Predicate = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Names of the three quota headers.
#[derive(Clone, Debug)]
pub struct RateLimitHeaders {
    pub remaining: String,
    pub reset: String,
    pub total: String,
}

impl Default for RateLimitHeaders {
    fn default() -> Self {
        Self {
            remaining: "Rate-Limit-Remaining".to_owned(),
            reset: "Rate-Limit-Reset".to_owned(),
            total: "Rate-Limit-Total".to_owned(),
        }
    }
}

/// Fixed-window limiter.
///
/// Every counted request gets the quota headers. Once a client's count for
/// the current window passes `max`, the request is rejected with `429` and
/// a `Retry-After` header, and nothing downstream runs.
#[derive(Clone)]
pub struct RateLimit {
    store: Arc<dyn RateLimitStore>,
    max: u64,
    window: Duration,
    prefix: String,
    id: IdExtractor,
    allowlist: Option<Predicate>,
    denylist: Option<Predicate>,
    headers: RateLimitHeaders,
    message: Option<String>,
}

impl RateLimit {
    /// 2500 requests per hour per client IP.
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self {
            store,
            max: 2500,
            window: Duration::from_secs(60 * 60),
            prefix: "limit".to_owned(),
            id: Arc::new(|ctx: &Context| ctx.ip().map(|ip| ip.to_string())),
            allowlist: None,
            denylist: None,
            headers: RateLimitHeaders::default(),
            message: None,
        }
    }

    pub fn max(mut self, max: u64) -> Self {
        self.max = max;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Namespace for store keys.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn id<F>(mut self, id: F) -> Self
    where
        F: Fn(&Context) -> Option<String> + Send + Sync + 'static,
    {
        self.id = Arc::new(id);
        self
    }

    /// Requests matching `pred` are never counted.
    pub fn allowlist<F>(mut self, pred: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.allowlist = Some(Arc::new(pred));
        self
    }

    /// Requests matching `pred` are rejected with `403`.
    pub fn denylist<F>(mut self, pred: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.denylist = Some(Arc::new(pred));
        self
    }

    pub fn headers(mut self, headers: RateLimitHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Replaces the default `429` message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Middleware for RateLimit {
    fn name(&self) -> &'static str { "rate-limit" }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let Some(id) = (self.id)(ctx) else {
                return next.run(ctx).await;
            };
            if self.allowlist.as_ref().is_some_and(|allowed| allowed(ctx)) {
                debug!(%id, "allow-listed, not counted");
                return next.run(ctx).await;
            }
            if self.denylist.as_ref().is_some_and(|denied| denied(ctx)) {
                warn!(%id, "deny-listed client rejected");
                return Err(HttpError::from_status(Status::Forbidden));
            }

            let key = format!("{}:{id}", self.prefix);
            let quota = self.store.increment(&key, self.window, self.max).await?;
            let reset = quota.reset.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);

            let res = ctx.response_mut();
            res.set_header(&self.headers.remaining, quota.remaining.to_string());
            res.set_header(&self.headers.reset, reset.to_string());
            res.set_header(&self.headers.total, self.max.to_string());

            if quota.count <= self.max {
                return next.run(ctx).await;
            }

            let retry_after = quota
                .reset
                .duration_since(SystemTime::now())
                .map(|d| d.as_secs_f64().ceil() as u64)
                .unwrap_or(0);
            debug!(%id, count = quota.count, retry_after, "rate limit exceeded");
            let message = self.message.clone().unwrap_or_else(|| {
                format!("Rate limit exceeded, retry in {retry_after} seconds.")
            });
            Err(HttpError::new(Status::TooManyRequests, message)
                .with_header("retry-after", retry_after.to_string()))
        })
    }
}
