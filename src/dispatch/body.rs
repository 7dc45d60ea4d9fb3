//! Request body decoding.

use async_trait::async_trait;

use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, ErrorKind};
use crate::http::request::Request;
use crate::session::Session;

/// Decodes a buffered JSON request body and replaces `request.body` with
/// the decoded value. An empty body is a no-op, not an error.
pub struct JsonBody;

#[async_trait]
impl Dispatcher for JsonBody {
    async fn dispatch(
        &self,
        request: &mut Request,
        _session: &mut Session,
    ) -> Result<(), DispatchError> {
        let bytes = request.body.bytes().await?;
        if bytes.is_empty() {
            return Ok(());
        }

        let value = serde_json::from_slice(&bytes).map_err(|source| {
            DispatchError::kind(ErrorKind::InvalidBody, "request body is not valid JSON")
                .with_status(400)
                .with_cause(source.to_string())
        })?;

        request.body.replace(value);
        Ok(())
    }
}
