//! Demo service: every built-in unit in front of a handful of routes.
//!
//! ```text
//! GET /         counts views in the session, answers with the client IP
//! GET /404      a client error
//! GET /500      a server error with a cause
//! GET /error    a panicking handler
//! GET /healthz  liveness
//! GET /readyz   readiness
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use serde_json::json;
use strata::config::Settings;
use strata::middleware::{
    BoxFuture, Compress, ConditionalGet, ErrorBoundary, Etag, Json, Keys, Logger, Outcome,
    RateLimit, ResponseTime, Sessions,
};
use strata::store::{MemoryRateLimitStore, MemorySessionStore, RateLimitStore, SessionStore};
use strata::{Context, HttpError, Pipeline, Router, Server, Status, health};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env().context("invalid configuration")?;
    info!(mode = ?settings.mode, port = settings.port, "starting");

    let (sessions, limits) = stores(&settings).await?;
    let keys = Keys::new(&settings.keys).context("invalid APP_KEYS")?;

    let router = Router::new()
        .get("/", index)
        .get("/404", not_found)
        .get("/500", broken)
        .get("/error", panics)
        .get("/healthz", health::liveness)
        .get("/readyz", health::readiness);

    let mut builder = Pipeline::builder()
        .boundary(ErrorBoundary::new(settings.mode))
        .layer(ResponseTime::default())
        .layer(Json::new())
        .layer(Compress::new().threshold(settings.compress_threshold))
        .layer(Logger::new())
        .layer(ConditionalGet::new())
        .layer(Etag::new())
        .layer(Sessions::new(sessions, keys))
        .layer(
            RateLimit::new(limits)
                .max(settings.rate_limit_max)
                .window(settings.rate_limit_window)
                .message("Sometimes You Just Have to Slow Down."),
        )
        .layer(router);
    if let Some(timeout) = settings.request_timeout {
        builder = builder.timeout(timeout);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    Server::bind(addr)
        .max_body(settings.max_body_bytes)
        .serve(builder.build())
        .await?;
    Ok(())
}

#[cfg(feature = "redis")]
async fn stores(
    settings: &Settings,
) -> anyhow::Result<(Arc<dyn SessionStore>, Arc<dyn RateLimitStore>)> {
    use strata::store::{RedisRateLimitStore, RedisSessionStore};

    let Some(url) = settings.redis_url.as_deref() else {
        return Ok(memory_stores());
    };
    let sessions: Arc<dyn SessionStore> =
        Arc::new(RedisSessionStore::connect(url).await.context("connecting session store")?);
    let limits: Arc<dyn RateLimitStore> =
        Arc::new(RedisRateLimitStore::connect(url).await.context("connecting rate-limit store")?);
    info!("using redis stores");
    Ok((sessions, limits))
}

#[cfg(not(feature = "redis"))]
async fn stores(
    settings: &Settings,
) -> anyhow::Result<(Arc<dyn SessionStore>, Arc<dyn RateLimitStore>)> {
    if settings.redis_url.is_some() {
        anyhow::bail!("REDIS_URL is set but strata was built without the `redis` feature");
    }
    Ok(memory_stores())
}

fn memory_stores() -> (Arc<dyn SessionStore>, Arc<dyn RateLimitStore>) {
    info!("using in-memory stores");
    (Arc::new(MemorySessionStore::new()), Arc::new(MemoryRateLimitStore::new()))
}

fn index(ctx: &mut Context) -> BoxFuture<'_, Outcome> {
    Box::pin(async move {
        let ip = ctx.ip().map(|ip| ip.to_string());
        if let Some(session) = ctx.session_mut() {
            let views = session.get("views").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
            session.insert("views", views);
            debug!(session = ?session.data(), "session");
        }
        ctx.response_mut().set_json(json!({ "nice": "job dude", "ip": ip }));
        Ok(())
    })
}

fn not_found(_ctx: &mut Context) -> BoxFuture<'_, Outcome> {
    Box::pin(async { Err(HttpError::new(Status::NotFound, "not found")) })
}

fn broken(_ctx: &mut Context) -> BoxFuture<'_, Outcome> {
    Box::pin(async {
        Err(HttpError::new(Status::InternalServerError, "bad implementation.")
            .with_cause(std::io::Error::other("upstream returned garbage")))
    })
}

fn panics(_ctx: &mut Context) -> BoxFuture<'_, Outcome> {
    Box::pin(async { panic!("handler blew up") })
}
