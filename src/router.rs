//! Request router.
//!
//! One ordered route list per HTTP method. A lookup walks the list for the
//! request's method and takes the **first** route whose pattern matches, in
//! registration order; there is no specificity ranking. When no route for
//! the method matches but a route for another method does, the answer is
//! `405 Method Not Allowed` with an `Allow` header; otherwise `404`.
//!
//! Registration consumes the router and hands it back, so once a `Router`
//! is shared with a [`Server`](crate::Server) the table cannot change.

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use http::header::{ALLOW, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span};

use crate::context::Context;
use crate::dispatch;
use crate::error::{Error, HandlerError};
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::{Middleware, MiddlewareChain};
use crate::pattern::{Params, PathMatch, Pattern};
use crate::request::Request;
use crate::response::Response;

/// A route waiting to be registered.
///
/// ```rust
/// use vireo::{Context, HandlerError, Route, StatusCode};
/// use vireo::middleware;
///
/// async fn show(ctx: Context) -> Result<(), HandlerError> {
///     ctx.json(StatusCode::OK, &ctx.param("id"))
/// }
///
/// let route = Route::get("/users/{id}", show)
///     .before(middleware::from_fn(|ctx, next| next.run(ctx)));
/// ```
#[derive(Debug)]
pub struct Route {
    method: Method,
    path: String,
    handler: BoxedHandler,
    before: MiddlewareChain,
    after: MiddlewareChain,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            method,
            path: path.into(),
            handler: handler.into_boxed_handler(),
            before: MiddlewareChain::new(),
            after: MiddlewareChain::new(),
        }
    }

    pub fn get(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::Get, path, handler)
    }

    pub fn post(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::Post, path, handler)
    }

    pub fn put(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::Put, path, handler)
    }

    pub fn delete(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::Delete, path, handler)
    }

    pub fn patch(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::Patch, path, handler)
    }

    pub fn options(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::Options, path, handler)
    }

    /// Appends a middleware that runs before the handler.
    pub fn before(mut self, middleware: impl Middleware) -> Self {
        self.before.push(middleware);
        self
    }

    /// Appends a middleware that runs after the handler.
    pub fn after(mut self, middleware: impl Middleware) -> Self {
        self.after.push(middleware);
        self
    }
}

/// Routes registered together behind a shared list of before-middleware.
///
/// The group's middleware is prepended to each route's own before-middleware
/// at registration time.
#[derive(Debug, Default)]
pub struct RouteGroup {
    before: MiddlewareChain,
    routes: Vec<Route>,
}

impl RouteGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before(mut self, middleware: impl Middleware) -> Self {
        self.before.push(middleware);
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }
}

/// A validated, registered route.
#[derive(Debug)]
pub(crate) struct Endpoint {
    pub(crate) method: Method,
    pub(crate) pattern: Pattern,
    pub(crate) handler: BoxedHandler,
    pub(crate) before: MiddlewareChain,
    pub(crate) after: MiddlewareChain,
}

impl Endpoint {
    fn compile(route: Route, group_before: &MiddlewareChain) -> Result<Self, Error> {
        if !route.method.is_routable() {
            return Err(Error::UnsupportedMethod(route.method));
        }
        Ok(Self {
            method: route.method,
            pattern: Pattern::parse(&route.path)?,
            handler: route.handler,
            before: group_before.concat(&route.before),
            after: route.after,
        })
    }
}

pub(crate) enum Lookup<'a> {
    Found { endpoint: &'a Endpoint, params: Params },
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

/// The application router.
///
/// Build it once at startup, then pass it to [`Server`](crate::Server) or call
/// [`Router::dispatch`] directly.
#[derive(Debug, Default)]
pub struct Router {
    routes: HashMap<Method, Vec<Endpoint>>,
    before: MiddlewareChain,
    after: MiddlewareChain,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a global middleware that runs before every route's handler.
    pub fn before(mut self, middleware: impl Middleware) -> Self {
        self.before.push(middleware);
        self
    }

    /// Adds a global middleware that runs after every route's handler.
    pub fn after(mut self, middleware: impl Middleware) -> Self {
        self.after.push(middleware);
        self
    }

    /// Registers a route. Returns `self` for chaining.
    ///
    /// Fails with [`Error::UnsupportedMethod`] for methods other than GET,
    /// POST, PUT, DELETE, PATCH and OPTIONS, and with
    /// [`Error::InvalidPattern`] for a malformed path pattern.
    pub fn route(self, route: Route) -> Result<Self, Error> {
        self.group(RouteGroup::new().route(route))
    }

    /// Registers every route of `group`, or none of them if any is invalid.
    pub fn group(mut self, group: RouteGroup) -> Result<Self, Error> {
        let endpoints = group
            .routes
            .into_iter()
            .map(|route| Endpoint::compile(route, &group.before))
            .collect::<Result<Vec<_>, _>>()?;

        for endpoint in endpoints {
            debug!(method = %endpoint.method, pattern = %endpoint.pattern, "route registered");
            self.routes.entry(endpoint.method).or_default().push(endpoint);
        }
        Ok(self)
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn lookup(&self, method: Method, path: &str) -> Lookup<'_> {
        if let Some(endpoints) = self.routes.get(&method) {
            for endpoint in endpoints {
                if let PathMatch::Matched(params) = endpoint.pattern.matches(path) {
                    return Lookup::Found { endpoint, params };
                }
            }
        }

        let mut allowed: Vec<Method> = self
            .routes
            .iter()
            .filter(|(m, endpoints)| {
                **m != method && endpoints.iter().any(|e| e.pattern.matches(path).is_match())
            })
            .map(|(m, _)| *m)
            .collect();

        if allowed.is_empty() {
            return Lookup::NotFound;
        }
        allowed.sort();
        Lookup::MethodNotAllowed { allowed }
    }

    /// Routes one request through the full pipeline and returns the response.
    pub async fn dispatch(&self, request: Request) -> http::Response<Full<Bytes>> {
        let span = info_span!("request", method = %request.method(), path = %request.path());
        self.dispatch_inner(request).instrument(span).await
    }

    async fn dispatch_inner(&self, request: Request) -> http::Response<Full<Bytes>> {
        let started = Instant::now();
        let response = Response::new();

        match self.lookup(request.method(), request.path()) {
            Lookup::Found { endpoint, params } => {
                let scope = CancellationToken::new();
                // Cancels the scope when dispatch ends or this future is dropped.
                let _guard = scope.clone().drop_guard();
                let ctx = Context::from_parts(request, response.clone(), params, scope);
                dispatch::run(endpoint, &self.before, &self.after, ctx).await;
            }
            Lookup::MethodNotAllowed { allowed } => {
                let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    response.set_header(ALLOW, value);
                }
                dispatch::write_error(
                    &response,
                    &HandlerError::with_status(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
                );
            }
            Lookup::NotFound => {
                dispatch::write_error(
                    &response,
                    &HandlerError::with_status(StatusCode::NOT_FOUND, "not found"),
                );
            }
        }

        let out = response.take();
        debug!(status = out.status().as_u16(), elapsed_us = started.elapsed().as_micros() as u64, "request finished");
        out
    }
}
