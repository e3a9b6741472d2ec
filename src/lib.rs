//! # strata
//!
//! An onion-style middleware pipeline on top of hyper, with the units most
//! services end up writing anyway.
//!
//! ## The model
//!
//! Every request gets one [`Context`]. An ordered list of units, each a
//! [`Middleware`](middleware::Middleware), wraps the next: a unit does its
//! pre-work, resumes the rest of the chain with `next.run(ctx).await`, then
//! does its post-work once everything downstream has finished. Errors climb
//! back out the same way and are turned into a response by the
//! [`ErrorBoundary`](middleware::ErrorBoundary), which the pipeline always
//! installs outermost.
//!
//! Included units:
//!
//! - [`ResponseTime`](middleware::ResponseTime): `X-Response-Time` header
//! - [`Json`](middleware::Json): pretty-prints JSON bodies
//! - [`Compress`](middleware::Compress): gzip / deflate above a threshold
//! - [`Logger`](middleware::Logger): access log through `tracing`
//! - [`ConditionalGet`](middleware::ConditionalGet) and [`Etag`](middleware::Etag): `304` for fresh requests
//! - [`Sessions`](middleware::Sessions): signed-cookie sessions over a [`store::SessionStore`]
//! - [`RateLimit`](middleware::RateLimit): fixed-window quotas over a [`store::RateLimitStore`]
//! - [`Router`]: radix-tree dispatch, `405`/`501` for near misses
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use strata::{Context, Pipeline, Router, Server};
//! use strata::middleware::{BoxFuture, Logger, Outcome, ResponseTime};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), strata::Error> {
//!     let pipeline = Pipeline::builder()
//!         .layer(ResponseTime::default())
//!         .layer(Logger::new())
//!         .layer(Router::new().get("/users/{id}", get_user))
//!         .build();
//!
//!     Server::bind(([0, 0, 0, 0], 3000).into()).serve(pipeline).await
//! }
//!
//! fn get_user(ctx: &mut Context) -> BoxFuture<'_, Outcome> {
//!     Box::pin(async move {
//!         let id = ctx.request().param("id").unwrap_or("unknown").to_owned();
//!         ctx.response_mut().set_json(json!({ "id": id }));
//!         Ok(())
//!     })
//! }
//! ```

mod context;
mod error;
mod method;
mod pipeline;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod config;
pub mod handler;
pub mod health;
pub mod middleware;
pub mod store;

pub use context::Context;
pub use error::{Error, ErrorKind, HttpError};
pub use handler::Handler;
pub use method::Method;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use request::Request;
pub use response::{Body, ContentType, Response};
pub use router::Router;
pub use server::Server;
pub use status::Status;
