//! Error vocabulary for the server core.
//!
//! # Responsibilities
//! - Define the stable error-kind codes surfaced on wire errors
//! - Carry dispatcher failures (message, code, status, hint headers, cause)
//! - Flatten cause chains into the `details` list of the error body
//!
//! # Design Decisions
//! - Codes are stable strings; HTTP status is advisory and defaults to 500
//! - Causes are `Arc`-shared so a single underlying failure can appear in
//!   several wrapping errors without copying
//! - The cause walk keeps a visited set, shared sub-causes are reported once

use std::collections::HashSet;
use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use thiserror::Error;

/// Stable error kinds used by the core.
///
/// Each kind maps to an opaque `code` string placed on errors and in the
/// wire error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `listen`/`close` called outside the state that permits it.
    NotAvailable,
    /// The client aborted the request before it completed.
    UpstreamAborted,
    /// The request stream errored.
    UpstreamError,
    /// The request stream was closed before the body could be read.
    UpstreamClosed,
    /// The response stream closed underneath the session.
    StreamClosed,
    /// The response stream errored.
    DownstreamError,
    /// A view field outside the fixed set was read.
    PropertyNotReadable,
    /// A view field outside the fixed set (or a read-only slot) was written.
    PropertyNotWritable,
    /// Encoding a record onto the SSE stream failed.
    ChannelTransformFailed,
    /// Route negotiation found no dispatcher for the request.
    NoRoute,
    /// A header required by negotiation was missing.
    HeaderMissing,
    /// The request body could not be decoded.
    InvalidBody,
    /// A dispatcher rejected; the underlying error is the cause.
    DispatchFailed,
}

impl ErrorKind {
    /// The stable wire code for this kind.
    pub const fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotAvailable => "E_HTTP_SERVER_NOT_AVAILABLE",
            ErrorKind::UpstreamAborted => "E_HTTP_SERVER_UPSTREAM_ABORTED",
            ErrorKind::UpstreamError => "E_HTTP_SERVER_UPSTREAM_ERROR",
            ErrorKind::UpstreamClosed => "E_HTTP_SERVER_UPSTREAM_CLOSED",
            ErrorKind::StreamClosed => "E_HTTP_SERVER_STREAM_CLOSED",
            ErrorKind::DownstreamError => "E_HTTP_SERVER_DOWNSTREAM_ERROR",
            ErrorKind::PropertyNotReadable => {
                "E_HTTP_SERVER_VIEW_MODEL_PROPERTY_NOT_READABLE"
            }
            ErrorKind::PropertyNotWritable => {
                "E_HTTP_SERVER_VIEW_MODEL_PROPERTY_NOT_WRITABLE"
            }
            ErrorKind::ChannelTransformFailed => {
                "E_HTTP_SERVER_VIEW_MODEL_CHANNEL_TRANSFORM_FAILED"
            }
            ErrorKind::NoRoute => "E_HTTP_SERVER_NO_ROUTE",
            ErrorKind::HeaderMissing => "E_HTTP_SERVER_HEADER_MISSING",
            ErrorKind::InvalidBody => "E_HTTP_SERVER_INVALID_BODY",
            ErrorKind::DispatchFailed => "E_HTTP_SERVER_DISPATCH_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A link in an error's cause chain.
#[derive(Debug, Clone)]
pub enum Cause {
    /// A nested error; contributes `"<code> - <message>"` and recurses.
    Error(Arc<DispatchError>),
    /// A list of causes, walked in order.
    List(Vec<Cause>),
    /// Free-form detail text, pushed as-is.
    Text(String),
}

impl From<DispatchError> for Cause {
    fn from(error: DispatchError) -> Self {
        Cause::Error(Arc::new(error))
    }
}

impl From<&str> for Cause {
    fn from(text: &str) -> Self {
        Cause::Text(text.to_string())
    }
}

impl From<String> for Cause {
    fn from(text: String) -> Self {
        Cause::Text(text)
    }
}

/// A failure produced by (or on behalf of) a dispatcher.
///
/// This is the error currency of the request path: middleware failures,
/// view misuse, abort reasons, and wrapped dispatcher rejections are all
/// `DispatchError`s. The session presents them through
/// [`View::present_error`](crate::view::View::present_error).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DispatchError {
    message: String,
    code: Option<String>,
    status: Option<u16>,
    headers: HeaderMap,
    cause: Option<Cause>,
}

impl DispatchError {
    /// Create an error with a message and nothing else.
    pub fn new(message: impl Into<String>) -> Self {
        DispatchError {
            message: message.into(),
            code: None,
            status: None,
            headers: HeaderMap::new(),
            cause: None,
        }
    }

    /// Create an error carrying a core kind's code.
    pub fn kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        DispatchError::new(message).with_code(kind.code())
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a hint header (e.g. `Allow`, `Accept`) merged into the
    /// response when the error is presented.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    /// When this error wraps another (`DispatchFailed`), the wrapped error;
    /// otherwise the error itself.
    pub fn unwrapped(&self) -> &DispatchError {
        match &self.cause {
            Some(Cause::Error(inner))
                if self.code.as_deref() == Some(ErrorKind::DispatchFailed.code()) =>
            {
                inner.as_ref()
            }
            _ => self,
        }
    }

    /// Flatten the cause chain into detail lines for the wire error body.
    ///
    /// Nested errors contribute `"<code> - <message>"` (message alone when
    /// no code is set) and recurse into their own cause; lists recurse in
    /// order; text is pushed verbatim. Returns an empty vec when there is
    /// no cause.
    pub fn details(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut seen: HashSet<*const DispatchError> = HashSet::new();
        if let Some(cause) = &self.cause {
            walk_cause(cause, &mut lines, &mut seen);
        }
        lines
    }
}

fn walk_cause(
    cause: &Cause,
    lines: &mut Vec<String>,
    seen: &mut HashSet<*const DispatchError>,
) {
    match cause {
        Cause::Error(error) => {
            if !seen.insert(Arc::as_ptr(error)) {
                return;
            }
            let line = match error.code.as_deref() {
                Some(code) => format!("{} - {}", code, error.message),
                None => error.message.clone(),
            };
            lines.push(line.trim().to_string());
            if let Some(next) = &error.cause {
                walk_cause(next, lines, seen);
            }
        }
        Cause::List(items) => {
            for item in items {
                walk_cause(item, lines, seen);
            }
        }
        Cause::Text(text) => lines.push(text.clone()),
    }
}

/// Infrastructure failures raised by bootstrap, `listen` and `close`.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The operation is not valid in the server's current state.
    #[error("not available: {0}")]
    NotAvailable(&'static str),

    /// Binding the listener failed.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// TLS material could not be loaded or assembled.
    #[error(transparent)]
    Tls(#[from] crate::net::tls::TlsError),

    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl ServerError {
    /// The stable wire code, when the failure maps to a core kind.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            ServerError::NotAvailable(_) => Some(ErrorKind::NotAvailable.code()),
            _ => None,
        }
    }
}
