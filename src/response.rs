//! The response sink shared by every stage of one request.
//!
//! Handlers and middlewares never build a response value and return it;
//! they write into the [`Response`] held by their [`Context`](crate::Context),
//! the way a streaming server's response writer works:
//!
//! - the first call that sets a status *commits* the response; later status
//!   changes and header edits are ignored (and logged),
//! - writing body bytes on an uncommitted response commits it as `200 OK`,
//! - body writes append.
//!
//! Clones share the same underlying state, so concurrent middleware branches
//! all write to the one response their request will send.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;
use tracing::warn;

use crate::error::HandlerError;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`Response::write_bytes`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }

    fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct State {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

/// Write side of one HTTP exchange.
#[derive(Clone, Debug, Default)]
pub struct Response {
    state: Arc<Mutex<State>>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing any previous value. Ignored once committed.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        let mut state = self.lock();
        if state.status.is_some() {
            warn!(header = %name, "header set after response was committed, ignoring");
            return;
        }
        state.headers.insert(name, value);
    }

    /// Commits the response with `status`. Only the first call has any effect.
    pub fn write_header(&self, status: StatusCode) {
        let mut state = self.lock();
        match state.status {
            None => state.status = Some(status),
            Some(committed) => {
                warn!(%committed, ignored = %status, "superfluous write_header call");
            }
        }
    }

    /// Appends body bytes, committing `200 OK` first if nothing was committed.
    pub fn write(&self, bytes: &[u8]) {
        let mut state = self.lock();
        state.status.get_or_insert(StatusCode::OK);
        state.body.extend_from_slice(bytes);
    }

    /// Sets the content type, commits `status`, then writes `body`.
    pub fn write_bytes(&self, status: StatusCode, content_type: ContentType, body: &[u8]) {
        self.set_header(CONTENT_TYPE, content_type.header_value());
        self.write_header(status);
        self.write(body);
    }

    /// Encodes `value` as JSON and writes it with `status`.
    ///
    /// The content type is always set to `application/json` and the status is
    /// always committed ahead of the body. An encoding failure leaves the sink
    /// untouched, so the error can still be written as a response.
    pub fn write_json<T: Serialize + ?Sized>(
        &self,
        status: StatusCode,
        value: &T,
    ) -> Result<(), HandlerError> {
        let body = serde_json::to_vec(value)?;
        self.write_bytes(status, ContentType::Json, &body);
        Ok(())
    }

    /// Writes literal text; sets `text/plain` unless a content type is already present.
    pub fn write_text(&self, text: &str) {
        let has_content_type = self.lock().headers.contains_key(CONTENT_TYPE);
        if !has_content_type && !self.is_committed() {
            self.set_header(CONTENT_TYPE, ContentType::Text.header_value());
        }
        self.write(text.as_bytes());
    }

    pub fn is_committed(&self) -> bool {
        self.lock().status.is_some()
    }

    /// The committed status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.lock().status
    }

    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.lock().headers.get(name).cloned()
    }

    /// Snapshot of the body written so far.
    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.lock().body)
    }

    /// Drains the sink into an `http` response. Uncommitted responses become
    /// an empty `200 OK`.
    pub(crate) fn take(&self) -> http::Response<Full<Bytes>> {
        let mut state = self.lock();
        let body = state.body.split().freeze();
        let mut response = http::Response::new(Full::new(body));
        *response.status_mut() = state.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = std::mem::take(&mut state.headers);
        response
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
