//! Log events emitted on the failure path.

mod common;

use std::sync::{Arc, Mutex};

use switchboard::dispatch::FnDispatcher;
use switchboard::{DispatchError, Route, RouteTable};
use tracing_subscriber::fmt::MakeWriter;

use common::{h1_get, serve};

/// A writer that captures formatted log lines in memory.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Capture {
        self.clone()
    }
}

// Runs on the current-thread runtime so every server task logs through the
// thread-default subscriber installed below.
#[tokio::test]
async fn failing_dispatcher_emits_a_fail_event_with_the_cause_code() {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let dispatcher = Arc::new(FnDispatcher::new(|_request, _session| {
        Err(DispatchError::new("Failed dispatcher test").with_code("E_TEST_FAILED_DISPATCHER"))
    }));
    let mut routes = RouteTable::new();
    routes.define("/test/fail", Route::new().on("method.*", dispatcher));
    let (server, addr) = serve(routes).await;

    let response = h1_get(addr, "/test/fail").await;
    assert_eq!(response.status, 500);

    let logs = capture.contents();
    assert!(logs.contains("kind=\"fail\""), "no fail event in: {}", logs);
    assert!(
        logs.contains("E_TEST_FAILED_DISPATCHER"),
        "fail event does not carry the dispatcher's code: {}",
        logs
    );

    server.close().await.unwrap();
}
