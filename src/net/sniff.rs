//! Protocol sniffing on freshly accepted connections.
//!
//! # Responsibilities
//! - Read the first 24 octets of a connection without consuming them
//! - Classify the connection as HTTP/2 (exact client preface) or HTTP/1.1
//! - Replay the sniffed bytes to the engine through a rewinding wrapper
//!
//! # Design Decisions
//! - TLS streams have no kernel-level peek, so the sniffed prefix is
//!   buffered in the wrapper and served before the inner stream on first
//!   reads; engines observe a pristine byte stream
//! - A short read means the peer will never complete a preface; the caller
//!   destroys the socket

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

/// The 24-byte HTTP/2 client connection preface.
pub(crate) const PREFACE: [u8; 24] = *b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Hard deadline from acceptance to a classifiable prefix.
pub(crate) const SNIFF_TIMEOUT: Duration = Duration::from_millis(1_000);

/// The protocol selected for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Protocol {
    H1,
    H2,
}

/// Read the first 24 bytes and classify the connection.
///
/// The bytes are pushed back onto the returned stream, so the engine sees
/// them again. Fails when the peer closes before 24 bytes arrive.
pub(crate) async fn sniff<S>(mut stream: S) -> io::Result<(Protocol, SniffedStream<S>)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut prefix = [0u8; PREFACE.len()];
    let mut filled = 0;

    while filled < prefix.len() {
        let n = stream.read(&mut prefix[filled..]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed during protocol sniff",
            ));
        }
        filled += n;
    }

    let protocol = if prefix == PREFACE {
        Protocol::H2
    } else {
        Protocol::H1
    };

    Ok((protocol, SniffedStream::new(prefix, stream)))
}

/// A stream that replays a sniffed prefix before the inner stream.
#[derive(Debug)]
pub(crate) struct SniffedStream<S> {
    prefix: Bytes,
    inner: S,
}

impl<S> SniffedStream<S> {
    fn new(prefix: [u8; PREFACE.len()], inner: S) -> Self {
        SniffedStream {
            prefix: Bytes::copy_from_slice(&prefix),
            inner,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for SniffedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.prefix.is_empty() {
            let take = this.prefix.len().min(buf.remaining());
            buf.put_slice(&this.prefix.split_to(take));
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for SniffedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, data)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
