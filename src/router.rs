//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. The router is itself a
//! [`Middleware`]: it sits innermost in the pipeline and either answers the
//! request or hands it to the end of the chain, which yields `404`.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::context::Context;
use crate::error::HttpError;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::{BoxFuture, Middleware, Next, Outcome};
use crate::status::Status;

/// The application router.
///
/// Build it once at startup and install it as the last unit of a
/// [`Pipeline`](crate::Pipeline). Each registration returns `self` so
/// calls chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `ctx.request().param("name")`
    /// retrieves them.
    ///
    /// # Panics
    ///
    /// On a malformed or conflicting path. Routes are fixed at startup.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, handler.into_boxed_handler())
    }

    /// `GET` and `HEAD`.
    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        let handler = handler.into_boxed_handler();
        self.add(Method::Head, path, Arc::clone(&handler)).add(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Put, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Patch, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Delete, path, handler)
    }

    fn add(mut self, method: Method, path: &str, handler: BoxedHandler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub(crate) fn lookup(
        &self,
        method: Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Methods with a route for `path`, in [`Method::ALL`] order.
    pub(crate) fn allowed(&self, path: &str) -> Vec<&'static str> {
        Method::ALL
            .iter()
            .filter(|m| self.routes.get(m).is_some_and(|tree| tree.at(path).is_ok()))
            .map(|m| m.as_str())
            .collect()
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl Middleware for Router {
    fn name(&self) -> &'static str { "router" }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let Ok(method) = ctx.request().method().parse::<Method>() else {
                return Err(HttpError::from_status(Status::NotImplemented));
            };

            if let Some((handler, params)) = self.lookup(method, ctx.request().path()) {
                ctx.request_mut().set_params(params);
                return handler.call(ctx).await;
            }

            let allowed = self.allowed(ctx.request().path());
            if allowed.is_empty() {
                debug!(path = ctx.request().path(), "no route");
                return next.run(ctx).await;
            }
            let allow = allowed.join(", ");
            if method == Method::Options {
                let res = ctx.response_mut();
                res.set_status(Status::Ok);
                res.set_header("allow", allow);
                return Ok(());
            }
            Err(HttpError::from_status(Status::MethodNotAllowed).with_header("allow", allow))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_ctx: &mut Context) -> BoxFuture<'_, Outcome> {
        Box::pin(async { Ok(()) })
    }

    #[test]
    fn get_registers_head() {
        let router = Router::new().get("/users/{id}", noop).delete("/users/{id}", noop);
        let (_, params) = router.lookup(Method::Head, "/users/7").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("7"));
        assert_eq!(router.allowed("/users/7"), vec!["GET", "HEAD", "DELETE"]);
        assert!(router.allowed("/nope").is_empty());
    }
}
