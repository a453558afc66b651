//! Middleware layer.
//!
//! A middleware wraps a handler and produces a handler. Everything else in
//! this module is about *running* middleware, and there are two ways to do it:
//!
//! - **Wrap-chain** — [`MiddlewareChain::compose`] folds a chain around a
//!   handler so the first-registered middleware is the outermost: it runs
//!   first on the way in and last on the way out.
//! - **Phase execution** — [`MiddlewareChain::execute`] runs each middleware
//!   on its own, wrapped around a no-op, stopping at the first error. This is
//!   how the dispatcher runs before/after middleware, and
//!   [`execute_async`] runs several such chains concurrently.
//!
//! ```rust
//! use vireo::middleware::{self, MiddlewareChain};
//! use vireo::{HandlerError, StatusCode};
//!
//! let auth = middleware::from_fn(|ctx, next| async move {
//!     if ctx.request().header("authorization").is_none() {
//!         return Err(HandlerError::with_status(StatusCode::UNAUTHORIZED, "missing token"));
//!     }
//!     next.run(ctx).await
//! });
//!
//! let chain = MiddlewareChain::new().with(auth);
//! assert_eq!(chain.len(), 1);
//! ```

mod fan_out;

pub use fan_out::{Completion, execute_async};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::error::HandlerError;
use crate::handler::{self, BoxedHandler, Handler};

/// Wraps a handler, producing a handler.
///
/// Implemented by closures of the shape `Fn(BoxedHandler) -> BoxedHandler`
/// and by [`from_fn`]. Implement it on your own type for stateful middleware.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self(next)
    }
}

/// The rest of the pipeline, as seen from inside a [`from_fn`] middleware.
pub struct Next(BoxedHandler);

impl Next {
    pub async fn run(self, ctx: Context) -> Result<(), HandlerError> {
        self.0.call(ctx).await
    }
}

/// Middleware built from an `async fn(Context, Next) -> Result<(), HandlerError>`.
pub struct FromFn<F>(Arc<F>);

/// Turns an async function of a context and the [`Next`] handler into a
/// [`Middleware`].
///
/// Not calling `next.run(ctx)` short-circuits whatever this middleware wraps.
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FromFn(Arc::new(f))
}

impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let f = Arc::clone(&self.0);
        (move |ctx: Context| f(ctx, Next(next.clone()))).into_boxed_handler()
    }
}

/// An ordered list of middleware.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware.
    pub fn push(&mut self, middleware: impl Middleware) {
        self.layers.push(Arc::new(middleware));
    }

    /// Appends a middleware. Returns `self` for chaining.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.push(middleware);
        self
    }

    /// Appends every middleware of `other`, keeping their order.
    pub fn extend(&mut self, other: &MiddlewareChain) {
        self.layers.extend(other.layers.iter().cloned());
    }

    /// A new chain running `self` first, then `other`.
    pub fn concat(&self, other: &MiddlewareChain) -> MiddlewareChain {
        let mut out = self.clone();
        out.extend(other);
        out
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wraps `handler` in every middleware of the chain.
    ///
    /// Layers are applied last-to-first, so the first-registered middleware
    /// ends up outermost.
    pub fn compose(&self, handler: impl Handler) -> BoxedHandler {
        self.layers
            .iter()
            .rev()
            .fold(handler.into_boxed_handler(), |next, layer| layer.wrap(next))
    }

    /// Runs each middleware in order, each wrapped around a no-op `next`.
    ///
    /// Stops at and returns the first error. A middleware that does not call
    /// its `next` only skips that no-op; the following entries still run.
    pub async fn execute(&self, ctx: &Context) -> Result<(), HandlerError> {
        for layer in &self.layers {
            layer.wrap(handler::noop()).call(ctx.clone()).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain").field("len", &self.layers.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::{StatusCode, Uri};

    use super::*;
    use crate::method::Method;
    use crate::request::Request;

    fn ctx() -> Context {
        Context::new(Request::new(Method::Get, Uri::from_static("/")))
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(log: &Log, name: &'static str) -> impl Middleware {
        let log = Arc::clone(log);
        from_fn(move |ctx, next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(format!("{name}:in"));
                let out = next.run(ctx).await;
                log.lock().unwrap().push(format!("{name}:out"));
                out
            }
        })
    }

    fn failing(status: StatusCode, message: &'static str) -> impl Middleware {
        from_fn(move |_ctx, _next| async move { Err::<(), _>(HandlerError::with_status(status, message)) })
    }

    #[tokio::test]
    async fn compose_runs_first_registered_outermost() {
        let log: Log = Arc::default();
        let chain = MiddlewareChain::new()
            .with(recording(&log, "a"))
            .with(recording(&log, "b"));

        let inner = Arc::clone(&log);
        let handler = chain.compose(move |_ctx: Context| {
            let inner = Arc::clone(&inner);
            async move {
                inner.lock().unwrap().push("handler".to_owned());
                Ok::<(), HandlerError>(())
            }
        });

        handler.call(ctx()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), ["a:in", "b:in", "handler", "b:out", "a:out"]);
    }

    #[tokio::test]
    async fn compose_short_circuits_when_next_is_skipped() {
        let reached = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&reached);
        let handler = MiddlewareChain::new()
            .with(failing(StatusCode::FORBIDDEN, "denied"))
            .compose(move |_ctx: Context| {
                let flag = Arc::clone(&flag);
                async move {
                    *flag.lock().unwrap() = true;
                    Ok::<(), HandlerError>(())
                }
            });

        let err = handler.call(ctx()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert!(!*reached.lock().unwrap());
    }

    #[tokio::test]
    async fn execute_stops_at_first_error() {
        let log: Log = Arc::default();
        let chain = MiddlewareChain::new()
            .with(recording(&log, "a"))
            .with(failing(StatusCode::BAD_REQUEST, "bad"))
            .with(recording(&log, "c"));

        let err = chain.execute(&ctx()).await.unwrap_err();
        assert_eq!(err.message(), "bad");
        assert_eq!(*log.lock().unwrap(), ["a:in", "a:out"]);
    }

    #[tokio::test]
    async fn execute_continues_past_middleware_that_skips_next() {
        let log: Log = Arc::default();
        let chain = MiddlewareChain::new()
            .with(from_fn(|_ctx, _next| async { Ok::<(), HandlerError>(()) }))
            .with(recording(&log, "b"));

        chain.execute(&ctx()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), ["b:in", "b:out"]);
    }

    #[tokio::test]
    async fn closure_middleware_wraps_next() {
        let chain = MiddlewareChain::new().with(|next: BoxedHandler| {
            (move |ctx: Context| {
                let next = next.clone();
                async move {
                    ctx.response().write(b"[");
                    next.call(ctx.clone()).await?;
                    ctx.response().write(b"]");
                    Ok::<(), HandlerError>(())
                }
            })
            .into_boxed_handler()
        });

        let c = ctx();
        chain
            .compose(|ctx: Context| async move { ctx.send_string("body") })
            .call(c.clone())
            .await
            .unwrap();
        assert_eq!(c.response().body(), "[body]");
    }

    #[test]
    fn concat_keeps_order() {
        let a = MiddlewareChain::new().with(failing(StatusCode::OK, "x"));
        let b = MiddlewareChain::new()
            .with(failing(StatusCode::OK, "y"))
            .with(failing(StatusCode::OK, "z"));
        assert_eq!(a.concat(&b).len(), 3);
        assert_eq!(b.concat(&a).len(), 3);
        assert!(MiddlewareChain::new().is_empty());
    }
}
