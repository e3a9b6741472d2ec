//! Middleware layer.
//!
//! A unit is anything implementing [`Middleware`]: it receives the request's
//! [`Context`] and a [`Next`] that resumes the rest of the chain. Code before
//! `next.run(ctx).await` is the pre-phase, code after it the post-phase.
//!
//! ```text
//!   request ─▶ m1.pre ─▶ m2.pre ─▶ … ─▶ handler
//!                                          │
//!  response ◀─ m1.post ◀─ m2.post ◀─ … ◀───┘
//! ```
//!
//! A unit that returns without running `next` short-circuits: nothing
//! further downstream executes. `Next::run` takes `self`, so resuming the
//! chain twice does not compile.
//!
//! # Writing a unit
//!
//! ```rust
//! use strata::Context;
//! use strata::middleware::{BoxFuture, Middleware, Next, Outcome};
//!
//! struct PoweredBy;
//!
//! impl Middleware for PoweredBy {
//!     fn name(&self) -> &'static str { "powered-by" }
//!
//!     fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
//!         Box::pin(async move {
//!             let outcome = next.run(ctx).await;
//!             ctx.response_mut().set_header("x-powered-by", "strata");
//!             outcome
//!         })
//!     }
//! }
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures::FutureExt;
use tracing::trace;

use crate::context::Context;
use crate::error::HttpError;
use crate::status::Status;

mod compress;
mod conditional;
mod error_boundary;
mod etag;
mod json;
mod logger;
mod rate_limit;
mod response_time;
mod session;

pub use compress::{Compress, Encoding};
pub use conditional::ConditionalGet;
pub use error_boundary::{ErrorBoundary, PostFormat, PreFormat};
pub use etag::Etag;
pub use json::Json;
pub use logger::Logger;
pub use rate_limit::{RateLimit, RateLimitHeaders};
pub use response_time::ResponseTime;
pub use session::{Keys, Session, Sessions};

/// A heap-allocated, type-erased future borrowing from the request.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What every unit and handler returns: success, or an error for the boundary.
pub type Outcome = Result<(), HttpError>;

/// The single capability every unit implements: the error boundary, the
/// limiter, the compressor and the router alike.
pub trait Middleware: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome>;
}

/// The rest of the chain, from the point of view of one unit.
pub struct Next<'a> {
    inner: Inner<'a>,
}

enum Inner<'a> {
    Unit {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    /// Nothing answered the request.
    End,
}

impl<'a> Next<'a> {
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self { inner: Inner::Unit { middleware, next: Box::new(next) } }
    }

    pub(crate) fn end() -> Self {
        Self { inner: Inner::End }
    }

    /// Runs the remainder of the chain and returns once everything
    /// downstream has finished.
    ///
    /// Refuses to enter another unit once the request has been cancelled.
    /// A panic downstream comes back as a `500` error instead of unwinding
    /// through the caller.
    pub async fn run(self, ctx: &mut Context) -> Outcome {
        if ctx.is_cancelled() {
            return Err(HttpError::aborted());
        }
        let fut = match self.inner {
            Inner::Unit { middleware, next } => {
                trace!(unit = middleware.name(), "enter");
                middleware.handle(ctx, *next)
            }
            Inner::End => return Err(HttpError::from_status(Status::NotFound)),
        };
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(HttpError::from_panic(panic)),
        }
    }
}
