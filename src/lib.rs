//! # vireo
//!
//! A minimal HTTP request-dispatch core. Nothing more.
//!
//! ## What it does
//!
//! - **Pattern routing** — `/users/{id}` style patterns, one literal or named
//!   segment at a time, first registered match wins.
//! - **Two-phase middleware** — before- and after-middleware per route and
//!   globally. Global before-middleware runs ahead of the route's own, and
//!   the first error stops the pipeline.
//! - **Typed errors** — a handler fails with either a generic error (`500`)
//!   or an error carrying its own status; both become `{"Error": "..."}`.
//! - **Per-request context** — request, response sink, path parameters, a
//!   cancellation scope, and copy-on-write key/value state.
//!
//! What it leaves to the layers around it: TLS, CORS, auth providers, file
//! uploads, colored logs. Put those in front of it or in a middleware.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use vireo::{Context, HandlerError, Route, Router, Server, StatusCode};
//! use vireo::middleware;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vireo::Error> {
//!     let app = Router::new()
//!         .before(middleware::from_fn(|ctx, next| async move {
//!             tracing::info!(path = ctx.request().path(), "incoming");
//!             next.run(ctx).await
//!         }))
//!         .route(Route::get("/users/{id}", get_user))?
//!         .route(Route::post("/users", create_user))?;
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! async fn get_user(ctx: Context) -> Result<(), HandlerError> {
//!     let id = ctx.param("id");
//!     ctx.json(StatusCode::OK, &serde_json::json!({ "id": id }))
//! }
//!
//! async fn create_user(ctx: Context) -> Result<(), HandlerError> {
//!     if ctx.request().body().is_empty() {
//!         return Err(HandlerError::with_status(StatusCode::BAD_REQUEST, "empty body"));
//!     }
//!     ctx.json(StatusCode::CREATED, &serde_json::json!({ "id": 99 }))
//! }
//! ```

mod context;
mod dispatch;
mod error;
mod handler;
mod method;
mod pattern;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;

pub use context::Context;
pub use error::{Error, HandlerError};
pub use handler::{BoxedHandler, Handler, HandlerFuture};
pub use http::StatusCode;
pub use method::Method;
pub use pattern::{Params, PathMatch, Pattern, match_path};
pub use request::Request;
pub use response::{ContentType, Response};
pub use router::{Route, RouteGroup, Router};
pub use server::Server;
