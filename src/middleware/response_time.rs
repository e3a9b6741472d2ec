//! `X-Response-Time` header.

use std::time::Instant;

use super::{BoxFuture, Middleware, Next, Outcome};
use crate::context::Context;

/// Measures how long everything downstream took and reports it in
/// `X-Response-Time`, on failures as well as successes.
#[derive(Clone, Debug, Default)]
pub struct ResponseTime {
    precise: bool,
}

impl ResponseTime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report fractional milliseconds (`1.234ms`) instead of whole ones.
    pub fn precise(mut self, precise: bool) -> Self {
        self.precise = precise;
        self
    }
}

impl Middleware for ResponseTime {
    fn name(&self) -> &'static str { "response-time" }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let started = Instant::now();
            let outcome = next.run(ctx).await;
            let elapsed = started.elapsed();
            let value = if self.precise {
                format!("{:.3}ms", elapsed.as_secs_f64() * 1000.0)
            } else {
                format!("{}ms", elapsed.as_millis())
            };
            ctx.response_mut().set_header("x-response-time", value);
            outcome
        })
    }
}
