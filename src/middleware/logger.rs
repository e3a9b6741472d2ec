//! Access log.

use tracing::{error, info, warn};

use super::{BoxFuture, Middleware, Next, Outcome};
use crate::context::Context;
use crate::error::ErrorKind;

/// Logs every request on the way in and its result on the way out.
///
/// ```text
/// INFO  <-- method=GET path=/
/// INFO  --> method=GET path=/ status=200 elapsed_ms=3 bytes=41
/// WARN  xxx method=GET path=/nope status=404 elapsed_ms=0
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct Logger;

impl Logger {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for Logger {
    fn name(&self) -> &'static str { "logger" }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let method = ctx.request().method().to_owned();
            let path = ctx.request().path().to_owned();
            info!(%method, %path, "<--");

            let started = std::time::Instant::now();
            let outcome = next.run(ctx).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match &outcome {
                Ok(()) => {
                    let res = ctx.response();
                    info!(
                        %method, %path,
                        status = res.status(),
                        elapsed_ms,
                        bytes = res.body().to_bytes().len(),
                        "-->"
                    );
                }
                Err(err) if err.kind() == ErrorKind::Server => {
                    error!(%method, %path, status = err.status(), elapsed_ms, "xxx");
                }
                Err(err) => {
                    warn!(%method, %path, status = err.status(), elapsed_ms, "xxx");
                }
            }
            outcome
        })
    }
}
