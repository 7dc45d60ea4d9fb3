//! HTTP/1.1 engine.
//!
//! # Responsibilities
//! - Drive a sniffed connection through hyper's http1 server machinery
//! - Build the request model and the per-request session
//! - Echo the `Connection` header and advertise the keep-alive timeout
//!
//! # Design Decisions
//! - The hyper service awaits the response handoff while the session runs
//!   on its own task, so a dispatcher can flush the head and stream while
//!   later requests on the socket queue behind it
//! - Request ids append the per-socket request ordinal to the session id

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONNECTION, HOST};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use url::Url;

use crate::error::{DispatchError, ErrorKind};
use crate::http::request::{BodyReceiver, Request, RequestBody};
use crate::http::transport::{Downstream, SwitchBody, Transport};
use crate::net::gateway::ServerContext;
use crate::session::{self, Abortion, Session};

/// Serve one sniffed connection with the HTTP/1.1 engine.
pub(crate) async fn serve<S>(stream: S, context: Arc<ServerContext>, scheme: &'static str)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let session_id = session::session_id();
    let ordinal = Arc::new(AtomicU64::new(0));

    let service = service_fn(move |incoming: hyper::Request<Incoming>| {
        let context = context.clone();
        let session_id = session_id.clone();
        let ordinal = ordinal.clone();
        async move {
            let index = ordinal.fetch_add(1, Ordering::Relaxed) + 1;
            let request_id = session::request_id(&session_id, index);
            Ok::<_, Infallible>(handle_request(incoming, context, scheme, request_id).await)
        }
    });

    if let Err(error) = hyper::server::conn::http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        tracing::debug!(error = %error, "h1 connection closed with error");
    }
}

async fn handle_request(
    incoming: hyper::Request<Incoming>,
    context: Arc<ServerContext>,
    scheme: &'static str,
    request_id: String,
) -> hyper::Response<SwitchBody> {
    let (parts, body) = incoming.into_parts();
    let url = absolute_url(scheme, &parts);

    let (downstream, handoff) = Downstream::h1();
    let transport = Transport::shared(downstream);

    stage_keep_alive(&transport, &parts.headers, &context);

    let session = Session::new(transport, context.stats.clone(), request_id.clone());
    let abortion = session.abortion.clone();

    let (tx, rx): (_, BodyReceiver) = oneshot::channel();
    tokio::spawn(buffer_body(body, tx, abortion.clone()));

    let request = Request::new(
        parts.method,
        parts.headers,
        url,
        request_id,
        RequestBody::pending(rx),
    );
    tokio::spawn(session::run(request, session, context.router.clone()));

    // hyper drops this future when the connection dies; the guard turns
    // that into a StreamClosed abort for the still-running session.
    let mut guard = CloseGuard {
        abortion: Some(abortion),
    };
    let result = handoff.await;
    guard.disarm();

    match result {
        Ok(response) => response,
        // The session went away without presenting anything.
        Err(_) => canned_error(),
    }
}

struct CloseGuard {
    abortion: Option<Abortion>,
}

impl CloseGuard {
    fn disarm(&mut self) {
        self.abortion.take();
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        if let Some(abortion) = self.abortion.take() {
            abortion.abort(Some(DispatchError::kind(
                ErrorKind::StreamClosed,
                "downstream closed before the response was presented",
            )));
        }
    }
}

/// Echo the request `Connection` header; on keep-alive, advertise the
/// configured timeout as `Keep-Alive: timeout=<secs>`.
fn stage_keep_alive(
    transport: &crate::http::transport::SharedTransport,
    headers: &http::HeaderMap,
    context: &ServerContext,
) {
    let Some(connection) = headers.get(CONNECTION) else {
        return;
    };
    let mut staged = transport.lock().unwrap();
    let _ = staged.set_header(CONNECTION, connection.clone());

    let keep_alive = connection
        .to_str()
        .map(|value| value.eq_ignore_ascii_case("keep-alive"))
        .unwrap_or(false);
    if keep_alive {
        let timeout = context.config.server.keep_alive_timeout_ms / 1_000;
        if let Ok(value) = HeaderValue::try_from(format!("timeout={}", timeout)) {
            let _ = staged.set_header(HeaderName::from_static("keep-alive"), value);
        }
    }
}

/// Buffer the request body in the background; the pending value rejects
/// when the upstream errors or goes away.
async fn buffer_body(
    body: Incoming,
    tx: oneshot::Sender<Result<Bytes, DispatchError>>,
    abortion: Abortion,
) {
    match body.collect().await {
        Ok(collected) => {
            let _ = tx.send(Ok(collected.to_bytes()));
        }
        Err(error) => {
            tracing::warn!(
                code = ErrorKind::UpstreamError.code(),
                error = %error,
                "request stream errored"
            );
            abortion.abort(Some(DispatchError::kind(
                ErrorKind::UpstreamAborted,
                "request aborted by the client",
            )));
            let _ = tx.send(Err(DispatchError::kind(
                ErrorKind::UpstreamClosed,
                "request stream closed before the body resolved",
            )
            .with_cause(error.to_string())));
        }
    }
}

/// The absolute request URL: scheme from the transport, authority from the
/// `Host` header, path and query from the request line.
fn absolute_url(scheme: &str, parts: &http::request::Parts) -> Url {
    let host = parts
        .headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    Url::parse(&format!("{}://{}{}", scheme, host, parts.uri))
        .unwrap_or_else(|_| Url::parse("http://localhost/").expect("literal url parses"))
}

/// Last-resort response when the session died without presenting.
fn canned_error() -> hyper::Response<SwitchBody> {
    let body = serde_json::json!({
        "status": 500,
        "error": "the session ended without a response",
    });
    let payload = serde_json::to_vec(&body).unwrap_or_default();

    let mut response = hyper::Response::new(SwitchBody::Full(http_body_util::Full::new(
        Bytes::from(payload),
    )));
    *response.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
