//! Built-in status dispatcher.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;

use crate::dispatch::Dispatcher;
use crate::error::DispatchError;
use crate::http::request::Request;
use crate::session::Session;

/// Reports server uptime and the lifecycle counters.
///
/// A trivial example of the dispatcher contract; mount it on a route to
/// get a JSON health snapshot.
pub struct StatusDispatcher {
    started: Instant,
}

impl StatusDispatcher {
    pub fn new() -> Self {
        StatusDispatcher {
            started: Instant::now(),
        }
    }
}

impl Default for StatusDispatcher {
    fn default() -> Self {
        StatusDispatcher::new()
    }
}

#[async_trait]
impl Dispatcher for StatusDispatcher {
    async fn dispatch(
        &self,
        _request: &mut Request,
        session: &mut Session,
    ) -> Result<(), DispatchError> {
        let stats = session.stats().snapshot();
        session.view.merge_body(json!({
            "uptime": self.started.elapsed().as_secs(),
            "dispatched": stats.dispatched,
            "completed": stats.completed,
            "abortions": stats.abortions,
            "rejections": stats.rejections,
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderMap, Method};
    use url::Url;

    #[tokio::test]
    async fn reports_counters_and_uptime() {
        let mut request = Request::new(
            Method::GET,
            HeaderMap::new(),
            Url::parse("http://localhost/status").unwrap(),
            "TEST.0001".into(),
            crate::http::request::RequestBody::buffered(Bytes::new()),
        );
        let mut session = Session::detached();
        session.stats().incr_dispatched();

        StatusDispatcher::new()
            .dispatch(&mut request, &mut session)
            .await
            .unwrap();

        let body = session.view.body();
        assert_eq!(body["dispatched"], 1);
        assert_eq!(body["completed"], 0);
        assert!(body["uptime"].as_u64().is_some());
    }
}
