//! Server-sent-event response stream.
//!
//! # Responsibilities
//! - Frame written records as `data: <json>\n\n`
//! - Abort the session with ChannelTransformFailed when encoding fails
//! - End the downstream when the dispatcher finishes the stream
//!
//! # Design Decisions
//! - The handle is constructed lazily by the view; the `content-type`
//!   side-effect happens there, before any bytes are written
//! - Writes flush the response head on first use (the transport handles
//!   that), so headers set before the first record still make the wire

use bytes::Bytes;
use serde::Serialize;

use crate::error::{DispatchError, ErrorKind};
use crate::http::transport::SharedTransport;
use crate::session::Abortion;

/// Object-mode stream onto the response body, framing each record as a
/// server-sent event.
pub struct SseStream {
    transport: SharedTransport,
    abortion: Abortion,
    ended: bool,
}

impl SseStream {
    pub(crate) fn new(transport: SharedTransport, abortion: Abortion) -> Self {
        SseStream {
            transport,
            abortion,
            ended: false,
        }
    }

    /// Encode one record and write it as an SSE frame.
    pub fn send<T: Serialize>(&mut self, record: &T) -> Result<(), DispatchError> {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(source) => {
                let error = DispatchError::kind(
                    ErrorKind::ChannelTransformFailed,
                    format!("encoding stream record failed: {}", source),
                );
                self.abortion.abort(Some(error.clone()));
                return Err(error);
            }
        };

        let frame = format!("data: {}\n\n", json);
        self.transport.lock().unwrap().write(Bytes::from(frame))
    }

    /// Finish the stream and end the response.
    pub fn end(&mut self) -> Result<(), DispatchError> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        self.transport.lock().unwrap().end(None).map(|_| ())
    }

    pub fn ended(&self) -> bool {
        self.ended
    }
}
