//! HTTP/2 engine.
//!
//! # Responsibilities
//! - Perform the h2 server handshake on a sniffed connection
//! - Register the session in the gateway's live-set for graceful drain
//! - Forward each inbound stream as one request/response pair
//!
//! # Design Decisions
//! - Streams on one session are independent and run on their own tasks;
//!   only the session object itself is closed once
//! - Flow-control capacity is released as the body buffers, so large
//!   uploads never stall the connection window
//! - Request ids append the h2 stream id to the session id

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::header::HOST;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use url::Url;

use crate::error::{DispatchError, ErrorKind};
use crate::http::request::{BodyReceiver, Request, RequestBody};
use crate::http::transport::{Downstream, Transport};
use crate::net::gateway::ServerContext;
use crate::session::{self, Abortion, Session};

/// Serve one sniffed connection with the HTTP/2 engine.
pub(crate) async fn serve<S>(stream: S, context: Arc<ServerContext>, scheme: &'static str)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut connection = match h2::server::handshake(stream).await {
        Ok(connection) => connection,
        Err(error) => {
            tracing::warn!(error = %error, "h2 handshake failed");
            return;
        }
    };

    let session_id = session::session_id();
    let (key, mut close_signal, done) = context.register_session();
    tracing::debug!(session = %session_id, "h2 session established");

    let mut draining = false;
    loop {
        tokio::select! {
            changed = close_signal.changed(), if !draining => {
                draining = true;
                if changed.is_ok() && *close_signal.borrow() {
                    // Send GOAWAY; accept keeps yielding the in-flight
                    // streams until the peer is done.
                    connection.graceful_shutdown();
                }
            }
            accepted = connection.accept() => match accepted {
                Some(Ok((request, respond))) => {
                    let context = context.clone();
                    let session_id = session_id.clone();
                    tokio::spawn(async move {
                        handle_stream(request, respond, context, scheme, session_id).await;
                    });
                }
                Some(Err(error)) => {
                    tracing::debug!(session = %session_id, error = %error, "h2 session errored");
                    break;
                }
                None => break,
            }
        }
    }

    context.unregister_session(key);
    let _ = done.send(());
    tracing::debug!(session = %session_id, "h2 session closed");
}

async fn handle_stream(
    request: http::Request<h2::RecvStream>,
    respond: h2::server::SendResponse<Bytes>,
    context: Arc<ServerContext>,
    scheme: &'static str,
    session_id: String,
) {
    let stream_id = u32::from(respond.stream_id());
    let request_id = session::request_id(&session_id, u64::from(stream_id));

    let (parts, body) = request.into_parts();
    let url = absolute_url(scheme, &parts);

    let transport = Transport::shared(Downstream::h2(respond));
    let session = Session::new(transport, context.stats.clone(), request_id.clone());
    let abortion = session.abortion.clone();

    let (tx, rx): (_, BodyReceiver) = oneshot::channel();
    tokio::spawn(buffer_body(body, tx, abortion));

    let request = Request::new(
        parts.method,
        parts.headers,
        url,
        request_id,
        RequestBody::pending(rx),
    );
    session::run(request, session, context.router.clone()).await;
}

/// Buffer the stream body, releasing flow-control capacity as data lands.
async fn buffer_body(
    mut body: h2::RecvStream,
    tx: oneshot::Sender<Result<Bytes, DispatchError>>,
    abortion: Abortion,
) {
    let mut buffer = BytesMut::new();
    loop {
        match body.data().await {
            Some(Ok(chunk)) => {
                let _ = body.flow_control().release_capacity(chunk.len());
                buffer.extend_from_slice(&chunk);
            }
            Some(Err(error)) => {
                tracing::warn!(
                    code = ErrorKind::UpstreamError.code(),
                    error = %error,
                    "stream body errored"
                );
                abortion.abort(Some(DispatchError::kind(
                    ErrorKind::UpstreamAborted,
                    "stream aborted by the client",
                )));
                let _ = tx.send(Err(DispatchError::kind(
                    ErrorKind::UpstreamClosed,
                    "stream closed before the body resolved",
                )
                .with_cause(error.to_string())));
                return;
            }
            None => break,
        }
    }
    let _ = tx.send(Ok(buffer.freeze()));
}

/// The absolute request URL: authority from `:authority` (or `Host`),
/// path and query from the pseudo-headers.
fn absolute_url(scheme: &str, parts: &http::request::Parts) -> Url {
    let authority = parts
        .uri
        .authority()
        .map(|authority| authority.as_str().to_string())
        .or_else(|| {
            parts
                .headers
                .get(HOST)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "localhost".to_string());
    let path = parts
        .uri
        .path_and_query()
        .map(|path| path.as_str())
        .unwrap_or("/");

    Url::parse(&format!("{}://{}{}", scheme, authority, path))
        .unwrap_or_else(|_| Url::parse("http://localhost/").expect("literal url parses"))
}
