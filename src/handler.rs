//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of *different* types in one table, and
//! middleware wraps handlers in other handlers. Both need a single type, so
//! every handler is hidden behind a trait object (`dyn ErasedHandler`) inside
//! a [`BoxedHandler`].
//!
//! ```text
//! async fn show(ctx: Context) -> Result<(), HandlerError> { … }  ← user writes this
//!        ↓ Route::get("/users/{id}", show)
//! show.into_boxed_handler()                                     ← Handler blanket impl
//!        ↓
//! BoxedHandler(Arc::new(FnHandler(show)))                       ← heap-allocated wrapper
//!        ↓
//! handler.call(ctx)  at request time                            ← one vtable dispatch
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::HandlerError;

/// A heap-allocated, type-erased handler future.
///
/// `Send + 'static` lets tokio move it across threads, which the concurrent
/// middleware fan-out relies on.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'static>>;

trait ErasedHandler {
    fn call(&self, ctx: Context) -> HandlerFuture;
}

/// A type-erased handler, cheap to clone and shared across concurrent requests.
///
/// Middleware receives the next handler as a `BoxedHandler` and returns a new
/// one; route handlers are stored as one.
#[derive(Clone)]
pub struct BoxedHandler(Arc<dyn ErasedHandler + Send + Sync + 'static>);

impl BoxedHandler {
    pub fn call(&self, ctx: Context) -> HandlerFuture {
        self.0.call(ctx)
    }
}

impl fmt::Debug for BoxedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoxedHandler")
    }
}

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by [`BoxedHandler`] and
/// by any function or closure with the signature:
///
/// ```text
/// async fn name(ctx: Context) -> Result<(), HandlerError>
/// ```
///
/// The trait is **sealed** (via the private `Sealed` supertrait) so the set
/// of handler shapes stays under this crate's control.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
}

impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        BoxedHandler(Arc::new(FnHandler(self)))
    }
}

impl private::Sealed for BoxedHandler {}

impl Handler for BoxedHandler {
    fn into_boxed_handler(self) -> BoxedHandler {
        self
    }
}

/// Bridges a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn call(&self, ctx: Context) -> HandlerFuture {
        Box::pin((self.0)(ctx))
    }
}

/// A handler that does nothing and succeeds.
pub(crate) fn noop() -> BoxedHandler {
    (|_ctx: Context| async { Ok::<(), HandlerError>(()) }).into_boxed_handler()
}
