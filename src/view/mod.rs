//! Outgoing-response view model.
//!
//! # Responsibilities
//! - Expose the strict four-field façade dispatchers mutate: `body`,
//!   `headers`, `status`, `stream`
//! - Deep-merge body writes so dispatchers compose without coordinating
//! - Present the final response (`present`) or an error body
//!   (`present_error`) exactly once
//!
//! # Design Decisions
//! - The field set is closed; the dynamic `read`/`write` accessors do the
//!   table-lookup guard and raise PropertyNotReadable/PropertyNotWritable
//!   synchronously at the point of access
//! - `headers` is a live proxy over the transport's staged header table
//! - The SSE stream is constructed on first access and cached; the
//!   `content-type` side-effect happens at construction

pub(crate) mod body;
pub mod stream;

use bytes::Bytes;
use http::header::{HeaderName, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};
use serde_json::{json, Map, Value};

use crate::error::{DispatchError, ErrorKind};
use crate::http::transport::SharedTransport;
use crate::session::Abortion;

pub use stream::SseStream;

/// The fixed, enumerable field set of the view.
pub const FIELDS: [&str; 4] = ["body", "headers", "status", "stream"];

/// The dispatcher-facing model of the outgoing response.
pub struct View {
    body: Value,
    transport: SharedTransport,
    stream: Option<SseStream>,
    abortion: Abortion,
}

impl View {
    pub(crate) fn new(transport: SharedTransport, abortion: Abortion) -> Self {
        View {
            body: Value::Object(Map::new()),
            transport,
            stream: None,
            abortion,
        }
    }

    /// The current body aggregate.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Deep-merge a value into the body. Mappings merge key-wise,
    /// everything else replaces.
    pub fn merge_body(&mut self, value: Value) {
        body::deep_merge(&mut self.body, value);
    }

    /// The staged response status.
    pub fn status(&self) -> u16 {
        self.transport.lock().unwrap().status().as_u16()
    }

    /// Set the response status; the write goes straight to the transport.
    pub fn set_status(&mut self, status: u16) {
        match StatusCode::from_u16(status) {
            Ok(status) => self.transport.lock().unwrap().set_status(status),
            Err(_) => tracing::warn!(status, "invalid status code ignored"),
        }
    }

    /// Live proxy over the transport's header table.
    pub fn headers(&self) -> Headers {
        Headers {
            transport: self.transport.clone(),
        }
    }

    /// Whether the response head is already on the wire.
    pub fn headers_sent(&self) -> bool {
        self.transport.lock().unwrap().headers_sent()
    }

    /// The SSE stream, constructed on first access.
    ///
    /// Construction sets `content-type: text/event-stream`; the head is
    /// flushed by the first write. Later accesses return the same stream.
    pub fn stream(&mut self) -> Result<&mut SseStream, DispatchError> {
        if self.stream.is_none() {
            {
                let mut transport = self.transport.lock().unwrap();
                if !transport.headers_sent() {
                    transport.set_header(
                        CONTENT_TYPE,
                        HeaderValue::from_static("text/event-stream"),
                    )?;
                }
            }
            self.stream = Some(SseStream::new(
                self.transport.clone(),
                self.abortion.clone(),
            ));
        }
        Ok(self.stream.as_mut().expect("stream was just installed"))
    }

    /// Dynamic field read with the strict-property guard.
    pub fn read(&mut self, name: &str) -> Result<Value, DispatchError> {
        match name {
            "body" => Ok(self.body.clone()),
            "status" => Ok(json!(self.status())),
            "headers" => Ok(self.headers().to_value()),
            // The stream handle is not value-representable; accessing the
            // name still constructs it. The typed accessor is the real API.
            "stream" => {
                self.stream()?;
                Ok(Value::Null)
            }
            _ => Err(property_not_readable(name)),
        }
    }

    /// Dynamic field write with the strict-property guard.
    pub fn write(&mut self, name: &str, value: Value) -> Result<(), DispatchError> {
        match name {
            "body" => {
                self.merge_body(value);
                Ok(())
            }
            "status" => match value.as_u64() {
                Some(status) if (100..=999).contains(&status) => {
                    self.set_status(status as u16);
                    Ok(())
                }
                _ => Err(DispatchError::kind(
                    ErrorKind::PropertyNotWritable,
                    "property 'status' expects an integer status code",
                )),
            },
            // Read-only slots.
            "headers" | "stream" => Err(property_not_writable(name)),
            _ => Err(property_not_writable(name)),
        }
    }

    /// Present the successful response: serialize the body as JSON and end
    /// the downstream. No-op when the downstream already ended.
    pub fn present(&mut self) -> Result<(), DispatchError> {
        let mut transport = self.transport.lock().unwrap();
        if transport.ended() {
            return Ok(());
        }
        if !transport.headers_sent() && transport.header("content-type").is_none() {
            transport.set_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))?;
        }
        let payload = serde_json::to_vec(&self.body)
            .map_err(|e| DispatchError::new(format!("body serialization failed: {}", e)))?;
        transport.end(Some(Bytes::from(payload)))?;
        Ok(())
    }

    /// Present an error response. No-op when the downstream already ended.
    pub fn present_error(&mut self, error: &DispatchError) -> Result<(), DispatchError> {
        let mut transport = self.transport.lock().unwrap();
        if transport.ended() {
            return Ok(());
        }

        if !transport.headers_sent() {
            for (name, value) in error.headers() {
                transport.set_header(name.clone(), value.clone())?;
            }
            if transport.header("content-type").is_none() {
                transport
                    .set_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))?;
            }
            let status = StatusCode::from_u16(error.status().unwrap_or(500))
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            transport.set_status(status);
        }

        let mut body = json!({
            "status": transport.status().as_u16(),
            "error": error.message(),
        });
        if let Some(code) = error.code() {
            body["code"] = json!(code);
        }
        let details = error.details();
        if !details.is_empty() {
            body["details"] = json!(details);
        }

        let payload = serde_json::to_vec(&body)
            .map_err(|e| DispatchError::new(format!("error serialization failed: {}", e)))?;
        transport.end(Some(Bytes::from(payload)))?;
        Ok(())
    }
}

fn property_not_readable(name: &str) -> DispatchError {
    DispatchError::kind(
        ErrorKind::PropertyNotReadable,
        format!(
            "property '{}' is not readable; valid properties are {}",
            name,
            FIELDS.join(", ")
        ),
    )
}

fn property_not_writable(name: &str) -> DispatchError {
    DispatchError::kind(
        ErrorKind::PropertyNotWritable,
        format!(
            "property '{}' is not writable; valid properties are {}",
            name,
            FIELDS.join(", ")
        ),
    )
}

/// Live proxy over the transport's staged header table.
pub struct Headers {
    transport: SharedTransport,
}

impl Headers {
    /// Read a header from the transport table.
    pub fn get(&self, name: &str) -> Option<String> {
        self.transport
            .lock()
            .unwrap()
            .header(name)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }

    /// Write a header through to the transport.
    pub fn set(&self, name: &str, value: &str) -> Result<(), DispatchError> {
        let (name, value) = parse_header(name, value)?;
        self.transport.lock().unwrap().set_header(name, value)
    }

    /// Append a value to a header.
    pub fn append(&self, name: &str, value: &str) -> Result<(), DispatchError> {
        let (name, value) = parse_header(name, value)?;
        self.transport.lock().unwrap().append_header(name, value)
    }

    /// Remove a header from the transport table.
    pub fn remove(&self, name: &str) -> Result<(), DispatchError> {
        self.transport.lock().unwrap().remove_header(name)
    }

    /// Stage a trailer, sent after a streamed body ends.
    pub fn add_trailer(&self, name: &str, value: &str) -> Result<(), DispatchError> {
        let (name, value) = parse_header(name, value)?;
        self.transport.lock().unwrap().add_trailer(name, value)
    }

    /// Enumerate the transport's header names.
    pub fn names(&self) -> Vec<String> {
        self.transport.lock().unwrap().header_names()
    }

    /// Whether the head is already on the wire.
    pub fn sent(&self) -> bool {
        self.transport.lock().unwrap().headers_sent()
    }

    /// Flush the head explicitly, switching the body to streaming mode.
    pub fn flush(&self) -> Result<(), DispatchError> {
        self.transport.lock().unwrap().flush_headers()
    }

    fn to_value(&self) -> Value {
        let transport = self.transport.lock().unwrap();
        let mut map = Map::new();
        for name in transport.header_names() {
            let values: Vec<String> = transport
                .headers()
                .get_all(&name)
                .iter()
                .filter_map(|value| value.to_str().ok().map(str::to_string))
                .collect();
            map.insert(name, json!(values.join(", ")));
        }
        Value::Object(map)
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), DispatchError> {
    let name = HeaderName::try_from(name)
        .map_err(|_| DispatchError::new(format!("invalid header name '{}'", name)))?;
    let value = HeaderValue::try_from(value)
        .map_err(|_| DispatchError::new(format!("invalid header value for '{}'", name)))?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::transport::{Downstream, Transport};
    use http_body_util::BodyExt;

    fn view() -> (View, crate::http::transport::HandoffReceiver) {
        let (downstream, rx) = Downstream::h1();
        let transport = Transport::shared(downstream);
        (View::new(transport, Abortion::new()), rx)
    }

    async fn body_of(rx: crate::http::transport::HandoffReceiver) -> (StatusCode, Value) {
        let response = rx.await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn body_writes_merge() {
        let (mut view, rx) = view();
        view.merge_body(json!({ "foo": "bar" }));
        view.merge_body(json!({ "nested": { "a": 1 } }));
        view.merge_body(json!({ "nested": { "b": 2 } }));
        view.present().unwrap();

        let (status, body) = body_of(rx).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "foo": "bar", "nested": { "a": 1, "b": 2 } })
        );
    }

    #[tokio::test]
    async fn present_defaults_content_type_to_json() {
        let (mut view, rx) = view();
        view.present().unwrap();

        let response = rx.await.unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn present_twice_is_a_no_op() {
        let (mut view, rx) = view();
        view.present().unwrap();
        view.merge_body(json!({ "late": true }));
        view.present().unwrap();

        let (_, body) = body_of(rx).await;
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn present_error_builds_the_wire_error_body() {
        let (mut view, rx) = view();
        let error = DispatchError::new("Aborted")
            .with_code("E_TEST_ABORT")
            .with_cause(
                DispatchError::new("Abortion test")
                    .with_code("E_TEST_ABORT_CAUSE")
                    .with_cause("Deeper detailed test"),
            );
        view.present_error(&error).unwrap();

        let (status, body) = body_of(rx).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], 500);
        assert_eq!(body["error"], "Aborted");
        assert_eq!(body["code"], "E_TEST_ABORT");
        assert_eq!(
            body["details"],
            json!(["E_TEST_ABORT_CAUSE - Abortion test", "Deeper detailed test"])
        );
    }

    #[tokio::test]
    async fn present_error_omits_details_and_code_when_absent() {
        let (mut view, rx) = view();
        view.present_error(&DispatchError::new("plain failure")).unwrap();

        let (_, body) = body_of(rx).await;
        assert_eq!(body["error"], "plain failure");
        assert!(body.get("code").is_none());
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn present_error_applies_status_and_hint_headers() {
        let (mut view, rx) = view();
        let error = DispatchError::kind(ErrorKind::NoRoute, "no dispatcher for method")
            .with_status(405)
            .with_header(http::header::ALLOW, HeaderValue::from_static("GET, POST"));
        view.present_error(&error).unwrap();

        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[http::header::ALLOW], "GET, POST");
    }

    #[tokio::test]
    async fn strict_guard_rejects_unknown_properties() {
        let (mut view, _rx) = view();

        let error = view.read("invalidAttribute").unwrap_err();
        assert_eq!(
            error.code(),
            Some("E_HTTP_SERVER_VIEW_MODEL_PROPERTY_NOT_READABLE")
        );
        assert!(error.message().contains("body, headers, status, stream"));

        let error = view.write("invalidAttribute", json!(1)).unwrap_err();
        assert_eq!(
            error.code(),
            Some("E_HTTP_SERVER_VIEW_MODEL_PROPERTY_NOT_WRITABLE")
        );
    }

    #[tokio::test]
    async fn read_only_slots_reject_writes() {
        let (mut view, _rx) = view();
        assert!(view.write("headers", json!({})).is_err());
        assert!(view.write("stream", json!(null)).is_err());
    }

    #[tokio::test]
    async fn dynamic_writes_reach_body_and_status() {
        let (mut view, rx) = view();
        view.write("body", json!({ "foo": "bar" })).unwrap();
        view.write("status", json!(204)).unwrap();
        view.present().unwrap();

        let (status, body) = body_of(rx).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, json!({ "foo": "bar" }));
    }

    #[tokio::test]
    async fn stream_access_sets_content_type_once() {
        let (mut view, _rx) = view();
        view.stream().unwrap();
        view.stream().unwrap();

        assert_eq!(
            view.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        assert_eq!(view.headers().names(), vec!["content-type".to_string()]);
    }

    #[tokio::test]
    async fn headers_proxy_round_trips() {
        let (view, _rx) = view();
        let headers = view.headers();
        headers.set("x-powered-by", "switchboard").unwrap();
        assert_eq!(headers.get("x-powered-by").unwrap(), "switchboard");

        headers.remove("x-powered-by").unwrap();
        assert!(headers.get("x-powered-by").is_none());
        assert!(!headers.sent());
    }
}
