//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`, so no new connections are made.
//! 2. Letting every in-flight connection task run to completion.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! Set `terminationGracePeriodSeconds` in your pod spec to a value longer
//! than your slowest request. 30 s is a reasonable default for most APIs.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::context::Context;
use crate::error::{Error, HttpError};
use crate::pipeline::Pipeline;
use crate::request::Request;
use crate::status::Status;

/// Largest request body buffered when none is configured: 1 MiB.
pub const DEFAULT_MAX_BODY: usize = 1024 * 1024;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    max_body: usize,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use strata::Server;
    /// let server = Server::bind(([0, 0, 0, 0], 3000).into());
    /// ```
    pub fn bind(addr: SocketAddr) -> Self {
        Self { addr, max_body: DEFAULT_MAX_BODY }
    }

    /// Request bodies longer than `bytes` are refused with `413` before
    /// any unit runs.
    pub fn max_body(mut self, bytes: usize) -> Self {
        self.max_body = bytes;
        self
    }

    /// Starts accepting connections and running each request through
    /// `pipeline`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, pipeline: Pipeline) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| Error::Bind { addr: self.addr, source })?;

        // Shared by every connection task; the pipeline is immutable.
        let pipeline = Arc::new(pipeline);

        let max_body = self.max_body;

        info!(addr = %self.addr, max_body, units = ?pipeline.unit_names(), "strata listening");

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM immediately stops
                // accepting new connections, even if more are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let pipeline = Arc::clone(&pipeline);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let pipeline = Arc::clone(&pipeline);
                            async move { dispatch(pipeline, req, remote_addr, max_body).await }
                        });

                        // HTTP/1.1 and HTTP/2, whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Drain: wait for every in-flight connection to finish before we return.
        while tasks.join_next().await.is_some() {}

        info!("strata stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Runs one request through the pipeline.
///
/// hyper drops this future when the connection goes away mid-request; the
/// drop guard then cancels the request token. An `Err` here only ever
/// means the request was abandoned, and hyper closes the connection.
async fn dispatch(
    pipeline: Arc<Pipeline>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
    max_body: usize,
) -> Result<http::Response<http_body_util::Full<Bytes>>, Error> {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();

    let (parts, body) = req.into_parts();
    let body = match read_body(body, max_body).await {
        Ok(bytes) => bytes,
        Err(BodyError::TooLarge) => {
            debug!(peer = %remote_addr, max_body, "request body too large");
            let req = Request::from_parts(parts, Bytes::new(), remote_addr);
            let res = pipeline.reject(Context::with_cancellation(req, token), too_large(max_body));
            guard.disarm();
            return Ok(res.into_http());
        }
        Err(BodyError::Aborted(e)) => {
            debug!(peer = %remote_addr, "request body aborted: {e}");
            return Err(Error::Aborted);
        }
    };

    let ctx = Context::with_cancellation(Request::from_parts(parts, body, remote_addr), token);
    let response = pipeline.execute(ctx).await;
    guard.disarm();

    response.map(|res| res.into_http()).ok_or(Error::Aborted)
}

enum BodyError {
    TooLarge,
    Aborted(Box<dyn std::error::Error + Send + Sync>),
}

/// Buffers `body`, giving up as soon as it grows past `limit` bytes.
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, BodyError>
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(BodyError::TooLarge),
        Err(e) => Err(BodyError::Aborted(e)),
    }
}

fn too_large(limit: usize) -> HttpError {
    HttpError::new(Status::ContentTooLarge, format!("Request body exceeds {limit} bytes"))
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and the
/// Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    // `pending()` never resolves, so on non-Unix platforms
    // the SIGTERM arm is effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    #[tokio::test]
    async fn bodies_within_limit_are_buffered() {
        let body = Full::new(Bytes::from_static(b"hello"));
        let bytes = read_body(body, 5).await.ok().unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn oversized_bodies_are_refused() {
        let body = Full::new(Bytes::from(vec![0u8; 6]));
        assert!(matches!(read_body(body, 5).await, Err(BodyError::TooLarge)));
    }

    #[tokio::test]
    async fn refusal_goes_through_the_boundary() {
        let pipeline = Pipeline::builder().build();
        let ctx = Context::new(Request::new("POST", "/upload"));
        let res = pipeline.reject(ctx, too_large(5));
        assert_eq!(res.status(), 413);
        match res.body() {
            crate::response::Body::Json(v) => {
                assert_eq!(v["name"], "ContentTooLargeError");
                assert_eq!(v["message"], "Request body exceeds 5 bytes");
            }
            other => panic!("expected json body, got {other:?}"),
        }
    }
}
