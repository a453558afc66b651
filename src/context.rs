//! Per-request context.
//!
//! A [`Context`] bundles everything a handler or middleware needs for one
//! request: the [`Request`], the shared [`Response`] sink, the path
//! [`Params`] the router extracted, a cancellation scope, and a set of
//! arbitrary key/value pairs.
//!
//! # Values are copy-on-write
//!
//! [`Context::with_value`] never mutates the context it is called on. It
//! returns a new context whose value list is the old list plus one entry.
//! The list is persistent: each entry points at its parent, so branching is a
//! single allocation and siblings share everything older than the branch.
//!
//! ```text
//! root ──► (user = alice) ──► (trace = 7)        ctx_a
//!                  └────────► (locale = pt-BR)   ctx_b
//! ```
//!
//! `ctx_a` cannot see `locale` and `ctx_b` cannot see `trace`. This is what
//! lets middleware chains running concurrently each extend their own context
//! without a lock; the price is that one branch's values are invisible to the
//! others.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;
use crate::pattern::Params;
use crate::request::Request;
use crate::response::Response;

struct Entry {
    key: Box<dyn Any + Send + Sync>,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Entry>>,
}

impl Entry {
    fn matches<K: Any + PartialEq>(&self, key: &K) -> bool {
        self.key.downcast_ref::<K>() == Some(key)
    }
}

/// The context handed to every handler and middleware.
///
/// Cloning is cheap: all parts are reference-counted.
#[derive(Clone)]
pub struct Context {
    request: Arc<Request>,
    response: Response,
    params: Arc<Params>,
    scope: CancellationToken,
    values: Option<Arc<Entry>>,
}

impl Context {
    /// A context for `request` with a fresh response, no path parameters, and
    /// no values.
    pub fn new(request: Request) -> Self {
        Self::from_parts(request, Response::new(), Params::new(), CancellationToken::new())
    }

    pub(crate) fn from_parts(
        request: Request,
        response: Response,
        params: Params,
        scope: CancellationToken,
    ) -> Self {
        Self {
            request: Arc::new(request),
            response,
            params: Arc::new(params),
            scope,
            values: None,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Cancelled when the request finishes or its connection goes away.
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    /// Returns a new context that also carries `key → value`.
    ///
    /// `self` is left untouched. A later binding for an equal key shadows an
    /// earlier one in the returned context only.
    ///
    /// ```rust
    /// use vireo::{Context, Method, Request};
    ///
    /// #[derive(PartialEq)]
    /// struct UserId;
    ///
    /// let root = Context::new(Request::new(Method::Get, "/".parse().unwrap()));
    /// let child = root.with_value(UserId, 42_u64);
    ///
    /// assert_eq!(child.value::<_, u64>(&UserId), Some(&42));
    /// assert_eq!(root.value::<_, u64>(&UserId), None);
    /// ```
    pub fn with_value<K, V>(&self, key: K, value: V) -> Context
    where
        K: Any + PartialEq + Send + Sync,
        V: Any + Send + Sync,
    {
        let entry = Entry {
            key: Box::new(key),
            value: Arc::new(value),
            parent: self.values.clone(),
        };
        Context { values: Some(Arc::new(entry)), ..self.clone() }
    }

    /// Looks up the nearest binding for `key`.
    ///
    /// Returns `None` when the key is absent, or when the nearest binding
    /// holds a value of a type other than `V`.
    pub fn value<K, V>(&self, key: &K) -> Option<&V>
    where
        K: Any + PartialEq,
        V: Any,
    {
        let mut cursor = self.values.as_deref();
        while let Some(entry) = cursor {
            if entry.matches(key) {
                return entry.value.downcast_ref::<V>();
            }
            cursor = entry.parent.as_deref();
        }
        None
    }

    /// A path parameter extracted by the router, or `""` when absent.
    pub fn param(&self, name: &str) -> &str {
        self.params.get(name).unwrap_or_default()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.request.query_param(name)
    }

    pub fn query_params(&self) -> HashMap<String, Vec<String>> {
        self.request.query_params()
    }

    /// Writes literal text to the response.
    pub fn send_string(&self, text: &str) -> Result<(), HandlerError> {
        self.response.write_text(text);
        Ok(())
    }

    /// Writes `value` as a JSON body with `status`.
    pub fn json<T: Serialize + ?Sized>(&self, status: StatusCode, value: &T) -> Result<(), HandlerError> {
        self.response.write_json(status, value)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.request.method())
            .field("path", &self.request.path())
            .field("params", &self.params)
            .field("cancelled", &self.scope.is_cancelled())
            .finish_non_exhaustive()
    }
}
