//! Per-request session lifecycle.
//!
//! # Data Flow
//! ```text
//! Engine emits a request/response pair
//!     → Session::new (view, abortion token, empty chain)
//!     → run(): counters, router dispatch, chain execution
//!     → fulfilled  → completed++,  view.present()
//!     → rejected   → rejections++, view.present_error(cause)
//!     → aborted    → abortions++,  present_error(reason) or present()
//! ```
//!
//! # Design Decisions
//! - The abortion token is checked after the chain settles; cancellation
//!   is cooperative and never interrupts a running dispatcher
//! - Presentation failures after the downstream ended are swallowed, a
//!   double send is impossible
//! - Session and request ids are base36 so they stay short in logs

pub mod abort;
pub mod stats;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::dispatch::Chain;
use crate::error::Cause;
use crate::http::request::Request;
use crate::http::transport::SharedTransport;
use crate::routing::{Route, Router};
use crate::view::View;

pub use abort::Abortion;
pub use stats::{Stats, StatsSnapshot};

/// The per-request record binding the view, the cancellation token, and
/// the dispatcher chain.
pub struct Session {
    /// The outgoing-response model dispatchers mutate.
    pub view: View,
    /// Single-shot cancellation token.
    pub abortion: Abortion,
    /// The dispatcher chain for this request.
    pub chain: Chain,
    route: Option<Arc<Route>>,
    id: String,
    stats: Arc<Stats>,
}

impl Session {
    pub(crate) fn new(transport: SharedTransport, stats: Arc<Stats>, id: String) -> Self {
        let abortion = Abortion::new();
        Session {
            view: View::new(transport, abortion.clone()),
            abortion,
            chain: Chain::new(),
            route: None,
            id,
            stats,
        }
    }

    /// The request id, unique per request on this server.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The route the router bound to this session.
    pub fn route(&self) -> Option<Arc<Route>> {
        self.route.clone()
    }

    pub(crate) fn bind_route(&mut self, route: Arc<Route>) {
        self.route = Some(route);
    }

    /// The server-wide lifecycle counters.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// A session wired to a discarded downstream, for unit tests.
    #[cfg(test)]
    pub(crate) fn detached() -> Session {
        use crate::http::transport::{Downstream, Transport};
        let (downstream, rx) = Downstream::h1();
        // Keep the handoff receiver alive so staged sends succeed.
        std::mem::forget(rx);
        Session::new(
            Transport::shared(downstream),
            Arc::new(Stats::new()),
            "TEST.SESSION".into(),
        )
    }
}

/// Drive one request through the router and present the outcome.
pub(crate) async fn run(mut request: Request, mut session: Session, router: Arc<Router>) {
    session.stats.incr_dispatched();

    let id = session.id().to_string();
    let method = request.method().clone();
    let path = request.url().path().to_string();

    let outcome = router.dispatch(&mut request, &mut session).await;

    // The abort token takes precedence over whatever the chain returned.
    if session.abortion.is_aborted() {
        session.stats.incr_abortions();
        match session.abortion.reason() {
            Some(reason) => {
                tracing::warn!(
                    request = %id,
                    code = reason.code().unwrap_or(""),
                    "session aborted: {}",
                    reason.message()
                );
                swallow(session.view.present_error(&reason));
            }
            None => swallow(session.view.present()),
        }
    } else {
        match outcome {
            Ok(()) => {
                session.stats.incr_completed();
                swallow(session.view.present());
            }
            Err(error) => {
                session.stats.incr_rejections();
                let cause_code = match error.cause() {
                    Some(Cause::Error(inner)) => inner.code().unwrap_or("").to_string(),
                    _ => String::new(),
                };
                tracing::error!(
                    kind = "fail",
                    request = %id,
                    code = error.code().unwrap_or(""),
                    cause = %cause_code,
                    "dispatch failed: {}",
                    error
                );
                swallow(session.view.present_error(error.unwrapped()));
            }
        }
    }

    let status = session.view.status();
    tracing::info!(request = %id, method = %method, path = %path, status, "request closed");
}

/// Presentation failures after the downstream went away are expected; log
/// them at debug and move on.
fn swallow(result: Result<(), crate::error::DispatchError>) {
    if let Err(error) = result {
        tracing::debug!(code = error.code().unwrap_or(""), "presentation failed: {}", error);
    }
}

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).expect("base36 digits are ascii")
}

fn random_base36(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| BASE36[rng.gen_range(0..36)] as char)
        .collect()
}

/// Session id: `<base36 millis>.<4-char base36 random>`, uppercased.
pub(crate) fn session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{}.{}", to_base36(millis), random_base36(4)).to_uppercase()
}

/// Request id: the session id plus a 4-char base36 discriminator (the
/// request ordinal on an h1 socket, the stream id on an h2 session).
pub(crate) fn request_id(session: &str, discriminator: u64) -> String {
    format!(
        "{}.{:0>4}",
        session,
        to_base36(discriminator as u128).to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_round_trip() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(36 * 36 + 1), "101");
    }

    #[test]
    fn session_id_shape() {
        let id = session_id();
        let mut parts = id.split('.');
        let millis = parts.next().unwrap();
        let random = parts.next().unwrap();
        assert!(parts.next().is_none());
        assert!(!millis.is_empty());
        assert_eq!(random.len(), 4);
        assert_eq!(id, id.to_uppercase());
    }

    #[test]
    fn request_id_appends_discriminator() {
        let id = request_id("ABC.1234", 1);
        assert_eq!(id, "ABC.1234.0001");

        let id = request_id("ABC.1234", 36);
        assert_eq!(id, "ABC.1234.0010");
    }
}
