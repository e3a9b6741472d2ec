//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! The router holds handlers of *different* types in one
//! `HashMap<Method, Tree>`, so each is hidden behind a trait object
//! (`dyn ErasedHandler`) and stored uniformly:
//!
//! ```text
//! fn hello(ctx: &mut Context) -> BoxFuture<'_, Outcome> { … }  ← user writes this
//!        ↓ router.get("/", hello)
//! hello.into_boxed_handler()                                   ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                                   ← stored as BoxedHandler
//!        ↓
//! handler.call(ctx)  at request time                           ← one vtable dispatch
//! ```
//!
//! A handler borrows the [`Context`] for the duration of its future, which
//! is why it returns a [`BoxFuture`] tied to that borrow instead of being an
//! `async fn`. Closures need [`from_fn`] so the compiler infers the
//! higher-ranked signature:
//!
//! ```rust
//! use strata::{Router, handler};
//!
//! let greeting = String::from("hello");
//! let router = Router::new().get("/", handler::from_fn(move |ctx| {
//!     let greeting = greeting.clone();
//!     Box::pin(async move {
//!         ctx.response_mut().set_text(greeting);
//!         Ok(())
//!     })
//! }));
//! ```

use std::sync::Arc;

use crate::context::Context;
use crate::middleware::{BoxFuture, Outcome};

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any function or
/// closure of the shape
///
/// ```text
/// for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Outcome>
/// ```
///
/// The trait is **sealed** (via the private `Sealed` supertrait): only the
/// blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F> private::Sealed for F where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Outcome> + Send + Sync + 'static
{
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Pins a closure to the handler signature.
///
/// Without it, a closure's return type cannot name the lifetime of its
/// argument and the blanket [`Handler`] impl does not apply.
pub fn from_fn<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    f
}

/// Bridges a concrete handler `F` to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F> ErasedHandler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Outcome> + Send + Sync,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        (self.0)(ctx)
    }
}
