//! Inbound request model.
//!
//! # Responsibilities
//! - Carry method, headers, and the parsed absolute URL
//! - Derive the criteria string the router matches against
//! - Buffer the request body in the background as a pending value
//! - Let middleware replace the buffered body with a decoded value
//!
//! # Design Decisions
//! - The body resolves at most once; the buffer is cached after the first
//!   await so later dispatchers see the same bytes
//! - A closed or errored upstream rejects the pending body with
//!   UpstreamClosed instead of surfacing transport internals

use bytes::Bytes;
use http::{HeaderMap, Method};
use serde_json::Value;
use tokio::sync::oneshot;
use url::Url;

use crate::error::{DispatchError, ErrorKind};

/// Receiver half of the background body-buffering task.
pub(crate) type BodyReceiver = oneshot::Receiver<Result<Bytes, DispatchError>>;

/// The request body as dispatchers observe it: first a pending buffer,
/// then the raw bytes, optionally replaced by a decoded value.
pub struct RequestBody {
    pending: Option<BodyReceiver>,
    buffered: Option<Bytes>,
    failure: Option<DispatchError>,
    decoded: Option<Value>,
}

impl RequestBody {
    pub(crate) fn pending(rx: BodyReceiver) -> Self {
        RequestBody {
            pending: Some(rx),
            buffered: None,
            failure: None,
            decoded: None,
        }
    }

    /// An already-buffered body; used by tests and internal callers.
    pub fn buffered(bytes: Bytes) -> Self {
        RequestBody {
            pending: None,
            buffered: Some(bytes),
            failure: None,
            decoded: None,
        }
    }

    /// Await the raw byte buffer, resolving the pending value on first use.
    pub async fn bytes(&mut self) -> Result<Bytes, DispatchError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        if let Some(bytes) = &self.buffered {
            return Ok(bytes.clone());
        }

        let rx = self.pending.take().ok_or_else(upstream_closed)?;
        match rx.await {
            Ok(Ok(bytes)) => {
                self.buffered = Some(bytes.clone());
                Ok(bytes)
            }
            Ok(Err(error)) => {
                self.failure = Some(error.clone());
                Err(error)
            }
            // The buffering task was dropped with the upstream.
            Err(_) => {
                let error = upstream_closed();
                self.failure = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Replace the body with a decoded value (e.g. parsed JSON).
    pub fn replace(&mut self, value: Value) {
        self.decoded = Some(value);
    }

    /// The decoded value, when a middleware has replaced the body.
    pub fn decoded(&self) -> Option<&Value> {
        self.decoded.as_ref()
    }
}

fn upstream_closed() -> DispatchError {
    DispatchError::kind(ErrorKind::UpstreamClosed, "request stream closed before the body resolved")
}

/// An inbound request.
///
/// Immutable to dispatchers except for `body` and `criteria`.
pub struct Request {
    method: Method,
    headers: HeaderMap,
    url: Url,
    criteria: String,
    id: String,
    /// The request body; dispatchers may await and replace it.
    pub body: RequestBody,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        headers: HeaderMap,
        url: Url,
        id: String,
        body: RequestBody,
    ) -> Self {
        let criteria = criteria_from_path(url.path());
        Request {
            method,
            headers,
            url,
            criteria,
            id,
            body,
        }
    }

    /// Upper-case request verb.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Case-insensitive header mapping.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Parsed absolute URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The pathname with trailing slashes stripped; the router's match key.
    pub fn criteria(&self) -> &str {
        &self.criteria
    }

    /// Rewrite the criteria (e.g. by a rewriting middleware).
    pub fn set_criteria(&mut self, criteria: impl Into<String>) {
        self.criteria = criteria.into();
    }

    /// Request id for logs and tracing.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Strip trailing slashes from a pathname to form the router match key.
pub(crate) fn criteria_from_path(path: &str) -> String {
    path.trim_end_matches('/').to_string()
}
