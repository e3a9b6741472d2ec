//! Built-in Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Register them on your router:
//!
//! ```rust,no_run
//! use strata::{Router, health};
//!
//! let app = Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness);
//! ```
//!
//! Replace `readiness` with your own handler to gate on dependencies:
//!
//! ```rust,no_run
//! use strata::{Context, HttpError, Status};
//! use strata::middleware::{BoxFuture, Outcome};
//!
//! fn readiness(ctx: &mut Context) -> BoxFuture<'_, Outcome> {
//!     Box::pin(async move {
//!         if !dependencies_are_healthy().await {
//!             return Err(HttpError::from_status(Status::ServiceUnavailable));
//!         }
//!         ctx.response_mut().set_text("ready");
//!         Ok(())
//!     })
//! }
//!
//! async fn dependencies_are_healthy() -> bool { true }
//! ```

use crate::context::Context;
use crate::middleware::{BoxFuture, Outcome};

/// Always `200 OK` with body `"ok"`. No dependencies.
pub fn liveness(ctx: &mut Context) -> BoxFuture<'_, Outcome> {
    Box::pin(async move {
        ctx.response_mut().set_text("ok");
        Ok(())
    })
}

/// Default readiness probe: `200 OK` with body `"ready"`.
pub fn readiness(ctx: &mut Context) -> BoxFuture<'_, Outcome> {
    Box::pin(async move {
        ctx.response_mut().set_text("ready");
        Ok(())
    })
}
