//! Composes units into one executable chain.
//!
//! ```text
//! ErrorBoundary ─▶ unit 1 ─▶ unit 2 ─▶ … ─▶ unit n ─▶ end (404)
//! ```
//!
//! The boundary is always outermost, so whatever a unit or handler raises
//! is formatted exactly once, after every post-phase has had its say.
//! Units run in registration order on the way in and in reverse on the way
//! out.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::context::Context;
use crate::error::HttpError;
use crate::middleware::{ErrorBoundary, Middleware, Next, Outcome};
use crate::response::Response;
use crate::status::Status;

/// An ordered, immutable sequence of units. Shared by every request.
pub struct Pipeline {
    boundary: ErrorBoundary,
    units: Vec<Arc<dyn Middleware>>,
    timeout: Option<Duration>,
}

enum Finish {
    Done(Outcome),
    Cancelled,
    TimedOut,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    fn chain(&self) -> Next<'_> {
        let mut next = Next::end();
        for unit in self.units.iter().rev() {
            next = Next::new(unit.as_ref(), next);
        }
        Next::new(&self.boundary, next)
    }

    /// Runs the chain over `ctx`.
    ///
    /// Returns `Ok` once the boundary has written a response, success or
    /// error. An `Err` escapes only for a cancelled request.
    pub async fn run(&self, ctx: &mut Context) -> Outcome {
        self.chain().run(ctx).await
    }

    /// Runs one request to completion and hands back the response to send.
    ///
    /// `None` means the request was cancelled: the chain has been dropped
    /// mid-flight, every unit suspended in it has released what it held, and
    /// there is nobody to answer.
    pub async fn execute(&self, mut ctx: Context) -> Option<Response> {
        let token = ctx.cancellation().clone();
        let finish = {
            let chain = self.run(&mut ctx);
            tokio::select! {
                biased;
                () = token.cancelled() => Finish::Cancelled,
                () = deadline(self.timeout) => Finish::TimedOut,
                outcome = chain => Finish::Done(outcome),
            }
        };

        match finish {
            Finish::Done(Ok(())) => Some(ctx.into_response()),
            Finish::Cancelled => {
                debug!(path = ctx.request().path(), "request cancelled");
                None
            }
            Finish::Done(Err(_)) if ctx.is_cancelled() => None,
            Finish::Done(Err(err)) => {
                self.boundary.respond(&mut ctx, err);
                Some(ctx.into_response())
            }
            Finish::TimedOut => {
                warn!(path = ctx.request().path(), timeout = ?self.timeout, "request timed out");
                self.boundary.respond(
                    &mut ctx,
                    HttpError::new(Status::ServiceUnavailable, "Request timed out"),
                );
                Some(ctx.into_response())
            }
        }
    }

    /// Answers a request that never entered the chain (its body was
    /// refused, for instance) through the boundary.
    pub fn reject(&self, mut ctx: Context, err: HttpError) -> Response {
        self.boundary.respond(&mut ctx, err);
        ctx.into_response()
    }

    /// Unit names in execution order, boundary first.
    pub fn unit_names(&self) -> Vec<&'static str> {
        std::iter::once(self.boundary.name())
            .chain(self.units.iter().map(|u| u.name()))
            .collect()
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

/// Builder for [`Pipeline`].
///
/// ```rust
/// use strata::{Pipeline, Router};
/// use strata::config::Mode;
/// use strata::middleware::{ErrorBoundary, Logger, ResponseTime};
///
/// let pipeline = Pipeline::builder()
///     .boundary(ErrorBoundary::new(Mode::Production))
///     .layer(ResponseTime::default())
///     .layer(Logger::new())
///     .layer(Router::new())
///     .build();
/// assert_eq!(pipeline.unit_names(), ["error-boundary", "response-time", "logger", "router"]);
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    boundary: ErrorBoundary,
    units: Vec<Arc<dyn Middleware>>,
    timeout: Option<Duration>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the default (development-mode) boundary.
    pub fn boundary(mut self, boundary: ErrorBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Appends a unit. Earlier units wrap later ones.
    pub fn layer<M: Middleware>(mut self, unit: M) -> Self {
        self.units.push(Arc::new(unit));
        self
    }

    /// Per-request deadline; late requests are answered with `503`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline { boundary: self.boundary, units: self.units, timeout: self.timeout }
    }
}
