//! Downstream response transport.
//!
//! # Responsibilities
//! - Stage status and headers until they are flushed
//! - Send a single-shot response body, or flush the head and stream
//! - Track `headers_sent` / `ended` so presentation is idempotent
//! - Bridge the two engines behind one seam (hyper handoff, h2 stream)
//!
//! # Design Decisions
//! - The staged header map is the transport header table; reads before the
//!   flush see exactly what will go on the wire
//! - The h1 engine receives the response through a oneshot handoff so the
//!   head can be flushed while the dispatcher chain is still running
//! - All operations are synchronous: the view façade and the SSE encoder
//!   must raise errors at the point of access, so streamed h1 bodies go
//!   through an unbounded channel drained by the connection task
//! - Send failures map to StreamClosed / DownstreamError and abort the
//!   session rather than panic

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use hyper::body::{Body, Frame};
use tokio::sync::{mpsc, oneshot};

use crate::error::{DispatchError, ErrorKind};

/// The transport as shared between the view, the session, and the SSE
/// stream handle. Locks are short and never held across awaits.
pub(crate) type SharedTransport = Arc<Mutex<Transport>>;

/// Response body handed to hyper: either a complete buffer or a channel
/// fed by the session while the connection task forwards frames.
pub(crate) enum SwitchBody {
    Full(Full<Bytes>),
    Channel(ChannelBody),
}

pub(crate) struct ChannelBody {
    rx: mpsc::UnboundedReceiver<Frame<Bytes>>,
}

impl Body for SwitchBody {
    type Data = Bytes;
    type Error = std::convert::Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            SwitchBody::Full(inner) => Pin::new(inner).poll_frame(cx),
            SwitchBody::Channel(channel) => match channel.rx.poll_recv(cx) {
                Poll::Ready(Some(frame)) => Poll::Ready(Some(Ok(frame))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            SwitchBody::Full(inner) => inner.is_end_stream(),
            SwitchBody::Channel(_) => false,
        }
    }

    fn size_hint(&self) -> hyper::body::SizeHint {
        match self {
            SwitchBody::Full(inner) => inner.size_hint(),
            SwitchBody::Channel(_) => hyper::body::SizeHint::default(),
        }
    }
}

/// Receiver side of the h1 response handoff, awaited by the hyper service.
pub(crate) type HandoffReceiver = oneshot::Receiver<Response<SwitchBody>>;

/// The engine-specific write side of a response.
pub(crate) enum Downstream {
    /// hyper http1: the head goes through a oneshot, streamed bodies
    /// through a channel drained by the connection task.
    H1 {
        handoff: Option<oneshot::Sender<Response<SwitchBody>>>,
        body: Option<mpsc::UnboundedSender<Frame<Bytes>>>,
    },
    /// h2: the stream is driven directly.
    H2 {
        respond: h2::server::SendResponse<Bytes>,
        stream: Option<h2::SendStream<Bytes>>,
    },
}

impl Downstream {
    pub(crate) fn h1() -> (Self, HandoffReceiver) {
        let (tx, rx) = oneshot::channel();
        (
            Downstream::H1 {
                handoff: Some(tx),
                body: None,
            },
            rx,
        )
    }

    pub(crate) fn h2(respond: h2::server::SendResponse<Bytes>) -> Self {
        Downstream::H2 {
            respond,
            stream: None,
        }
    }

    fn send_full(
        &mut self,
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<(), DispatchError> {
        let head = build_head(status, headers);
        match self {
            Downstream::H1 { handoff, .. } => {
                let tx = handoff.take().ok_or_else(head_already_sent)?;
                let (parts, _) = head.into_parts();
                let response = Response::from_parts(parts, SwitchBody::Full(Full::new(body)));
                tx.send(response).map_err(|_| stream_closed())
            }
            Downstream::H2 { respond, .. } => {
                let end = body.is_empty();
                let mut stream = respond
                    .send_response(head, end)
                    .map_err(downstream_error)?;
                if !end {
                    stream.send_data(body, true).map_err(downstream_error)?;
                }
                Ok(())
            }
        }
    }

    fn send_streaming(
        &mut self,
        status: StatusCode,
        headers: HeaderMap,
    ) -> Result<(), DispatchError> {
        let head = build_head(status, headers);
        match self {
            Downstream::H1 { handoff, body } => {
                let tx = handoff.take().ok_or_else(head_already_sent)?;
                let (data_tx, data_rx) = mpsc::unbounded_channel();
                let (parts, _) = head.into_parts();
                let response =
                    Response::from_parts(parts, SwitchBody::Channel(ChannelBody { rx: data_rx }));
                tx.send(response).map_err(|_| stream_closed())?;
                *body = Some(data_tx);
                Ok(())
            }
            Downstream::H2 { respond, stream } => {
                let send = respond
                    .send_response(head, false)
                    .map_err(downstream_error)?;
                *stream = Some(send);
                Ok(())
            }
        }
    }

    fn send_data(&mut self, data: Bytes) -> Result<(), DispatchError> {
        match self {
            Downstream::H1 { body, .. } => {
                let tx = body.as_ref().ok_or_else(head_not_sent)?;
                tx.send(Frame::data(data)).map_err(|_| stream_closed())
            }
            Downstream::H2 { stream, .. } => {
                let send = stream.as_mut().ok_or_else(head_not_sent)?;
                send.send_data(data, false).map_err(downstream_error)
            }
        }
    }

    fn send_trailers(&mut self, trailers: HeaderMap) -> Result<(), DispatchError> {
        match self {
            Downstream::H1 { body, .. } => {
                let tx = body.take().ok_or_else(head_not_sent)?;
                tx.send(Frame::trailers(trailers))
                    .map_err(|_| stream_closed())
            }
            Downstream::H2 { stream, .. } => {
                let send = stream.as_mut().ok_or_else(head_not_sent)?;
                send.send_trailers(trailers).map_err(downstream_error)
            }
        }
    }

    fn finish(&mut self) -> Result<(), DispatchError> {
        match self {
            Downstream::H1 { body, .. } => {
                // Dropping the sender ends the channel body.
                body.take();
                Ok(())
            }
            Downstream::H2 { stream, .. } => {
                let send = stream.as_mut().ok_or_else(head_not_sent)?;
                send.send_data(Bytes::new(), true).map_err(downstream_error)
            }
        }
    }
}

fn build_head(status: StatusCode, headers: HeaderMap) -> Response<()> {
    let mut head = Response::new(());
    *head.status_mut() = status;
    *head.headers_mut() = headers;
    head
}

fn stream_closed() -> DispatchError {
    DispatchError::kind(ErrorKind::StreamClosed, "response stream closed")
}

fn downstream_error(error: h2::Error) -> DispatchError {
    DispatchError::kind(ErrorKind::DownstreamError, error.to_string())
}

fn head_already_sent() -> DispatchError {
    DispatchError::kind(ErrorKind::DownstreamError, "response head already sent")
}

fn head_not_sent() -> DispatchError {
    DispatchError::kind(ErrorKind::DownstreamError, "response head not sent")
}

/// Staged response state shared by the view and the session.
pub(crate) struct Transport {
    status: StatusCode,
    headers: HeaderMap,
    trailers: Option<HeaderMap>,
    headers_sent: bool,
    ended: bool,
    downstream: Downstream,
}

impl Transport {
    pub(crate) fn new(downstream: Downstream) -> Self {
        Transport {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            trailers: None,
            headers_sent: false,
            ended: false,
            downstream,
        }
    }

    pub(crate) fn shared(downstream: Downstream) -> SharedTransport {
        Arc::new(Mutex::new(Transport::new(downstream)))
    }

    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: StatusCode) {
        if self.headers_sent {
            tracing::warn!(status = %status, "status write after headers were sent is ignored");
            return;
        }
        self.status = status;
    }

    pub(crate) fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub(crate) fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn header_names(&self) -> Vec<String> {
        self.headers.keys().map(|name| name.to_string()).collect()
    }

    pub(crate) fn set_header(
        &mut self,
        name: http::header::HeaderName,
        value: HeaderValue,
    ) -> Result<(), DispatchError> {
        self.writable_guard(name.as_str())?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub(crate) fn append_header(
        &mut self,
        name: http::header::HeaderName,
        value: HeaderValue,
    ) -> Result<(), DispatchError> {
        self.writable_guard(name.as_str())?;
        self.headers.append(name, value);
        Ok(())
    }

    pub(crate) fn remove_header(&mut self, name: &str) -> Result<(), DispatchError> {
        self.writable_guard(name)?;
        self.headers.remove(name);
        Ok(())
    }

    /// Stage a trailer, delivered after a streamed body. Trailers on a
    /// single-shot response are dropped with the framing that cannot carry
    /// them.
    pub(crate) fn add_trailer(
        &mut self,
        name: http::header::HeaderName,
        value: HeaderValue,
    ) -> Result<(), DispatchError> {
        if self.ended {
            return Err(stream_closed());
        }
        self.trailers
            .get_or_insert_with(HeaderMap::new)
            .append(name, value);
        Ok(())
    }

    fn writable_guard(&self, name: &str) -> Result<(), DispatchError> {
        if self.headers_sent {
            return Err(DispatchError::kind(
                ErrorKind::PropertyNotWritable,
                format!("header '{}' is read-only once headers are sent", name),
            ));
        }
        Ok(())
    }

    pub(crate) fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    pub(crate) fn ended(&self) -> bool {
        self.ended
    }

    /// Flush the staged head and switch the body to streaming mode.
    pub(crate) fn flush_headers(&mut self) -> Result<(), DispatchError> {
        if self.headers_sent {
            return Ok(());
        }
        self.downstream
            .send_streaming(self.status, self.headers.clone())?;
        self.headers_sent = true;
        Ok(())
    }

    /// Write body bytes, flushing the head first when necessary.
    pub(crate) fn write(&mut self, data: Bytes) -> Result<(), DispatchError> {
        if self.ended {
            return Err(stream_closed());
        }
        self.flush_headers()?;
        self.downstream.send_data(data)
    }

    /// End the response. Before the flush this sends a complete response in
    /// one shot; after it, the streamed body is finished. Returns whether
    /// this call actually ended the response.
    pub(crate) fn end(&mut self, body: Option<Bytes>) -> Result<bool, DispatchError> {
        if self.ended {
            return Ok(false);
        }
        if self.headers_sent {
            if let Some(data) = body {
                if !data.is_empty() {
                    self.downstream.send_data(data)?;
                }
            }
            match self.trailers.take() {
                Some(trailers) => self.downstream.send_trailers(trailers)?,
                None => self.downstream.finish()?,
            }
        } else {
            self.downstream
                .send_full(self.status, self.headers.clone(), body.unwrap_or_default())?;
            self.headers_sent = true;
        }
        self.ended = true;
        Ok(true)
    }
}
