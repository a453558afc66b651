//! Per-request pipeline.
//!
//! ```text
//! before (global ++ route) ──err──► write_error, stop
//!        │ ok
//! method check ──mismatch──► 405
//!        │ ok
//! handler ──err──► write_error
//!        │
//! after (route ++ global) ──err──► write_error
//! ```
//!
//! `++` joins two chains into one: global before-middleware runs ahead of the
//! route's own, and its first error stops the route's from running at all.
//! Each phase goes through [`execute_async`] as a single-chain group.
//! [`write_error`] is the only place an error turns into an HTTP response.

use http::StatusCode;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::context::Context;
use crate::error::HandlerError;
use crate::middleware::{MiddlewareChain, execute_async};
use crate::response::Response;
use crate::router::Endpoint;

/// Wire shape of every error body.
#[derive(Serialize)]
struct ErrorBody<'a> {
    #[serde(rename = "Error")]
    error: &'a str,
}

pub(crate) async fn run(
    endpoint: &Endpoint,
    global_before: &MiddlewareChain,
    global_after: &MiddlewareChain,
    ctx: Context,
) {
    let before = execute_async(&ctx, [global_before.concat(&endpoint.before)]);
    if let Some(err) = before.wait().await.into_iter().next() {
        write_error(ctx.response(), &err);
        return;
    }

    // Lookup already filters by method; this only guards direct callers.
    if endpoint.method != ctx.request().method() {
        write_error(
            ctx.response(),
            &HandlerError::with_status(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
        );
    } else if let Err(err) = endpoint.handler.call(ctx.clone()).await {
        write_error(ctx.response(), &err);
    }

    let after = execute_async(&ctx, [endpoint.after.concat(global_after)]);
    if let Some(err) = after.wait().await.into_iter().next() {
        write_error(ctx.response(), &err);
    }
}

/// Writes `err` as `{"Error": "<message>"}` with the error's status.
///
/// Once a response is committed its status can no longer change, so an error
/// raised after that point is logged and dropped.
pub(crate) fn write_error(response: &Response, err: &HandlerError) {
    let status = err.status();
    if status.is_server_error() {
        error!(status = status.as_u16(), error = %err, "request failed");
    } else {
        warn!(status = status.as_u16(), error = %err, "request rejected");
    }

    if let Some(committed) = response.status() {
        debug!(%committed, "response already committed, error not written");
        return;
    }

    if let Err(e) = response.write_json(status, &ErrorBody { error: err.message() }) {
        error!(error = %e, "failed to encode error body");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use bytes::Bytes;
    use http::Uri;
    use http::header::CONTENT_TYPE;

    use super::*;
    use crate::handler::Handler;
    use crate::method::Method;
    use crate::pattern::Pattern;
    use crate::request::Request;

    #[tokio::test]
    async fn endpoint_method_is_rechecked_before_the_handler() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let endpoint = Endpoint {
            method: Method::Get,
            pattern: Pattern::parse("/items").unwrap(),
            handler: (move |_ctx: Context| {
                flag.store(true, Ordering::SeqCst);
                async { Ok::<(), HandlerError>(()) }
            })
            .into_boxed_handler(),
            before: MiddlewareChain::new(),
            after: MiddlewareChain::new(),
        };

        let ctx = Context::new(Request::new(Method::Post, Uri::from_static("/items")));
        run(&endpoint, &MiddlewareChain::new(), &MiddlewareChain::new(), ctx.clone()).await;

        assert_eq!(ctx.response().status(), Some(StatusCode::METHOD_NOT_ALLOWED));
        assert_eq!(ctx.response().body(), Bytes::from_static(br#"{"Error":"method not allowed"}"#));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn statused_error_keeps_status() {
        let res = Response::new();
        write_error(&res, &HandlerError::with_status(StatusCode::CONFLICT, "taken"));
        assert_eq!(res.status(), Some(StatusCode::CONFLICT));
        assert_eq!(res.body(), Bytes::from_static(br#"{"Error":"taken"}"#));
        assert_eq!(res.header(&CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn generic_error_is_500() {
        let res = Response::new();
        write_error(&res, &HandlerError::new("db down"));
        assert_eq!(res.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(res.body(), Bytes::from_static(br#"{"Error":"db down"}"#));
    }

    #[test]
    fn committed_response_is_left_alone() {
        let res = Response::new();
        res.write_text("partial");
        write_error(&res, &HandlerError::new("late"));
        assert_eq!(res.status(), Some(StatusCode::OK));
        assert_eq!(res.body(), Bytes::from_static(b"partial"));
    }
}
