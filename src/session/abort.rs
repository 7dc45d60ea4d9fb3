//! Single-shot session cancellation.
//!
//! # Responsibilities
//! - Carry the abort signal and its optional reason for one session
//! - Guarantee first-reason-wins, idempotent firing
//! - Wake every observer registered at session construction
//!
//! # Design Decisions
//! - Cancellation is cooperative: firing never interrupts the dispatcher
//!   that is currently running; the completion handler checks the token
//! - Observers wait on a watch channel so late subscribers still see a
//!   token that fired before they subscribed

use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::error::DispatchError;

/// The session's single-shot cancellation token.
#[derive(Clone)]
pub struct Abortion {
    shared: Arc<Shared>,
}

struct Shared {
    reason: Mutex<Option<DispatchError>>,
    tx: watch::Sender<bool>,
}

impl Abortion {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Abortion {
            shared: Arc::new(Shared {
                reason: Mutex::new(None),
                tx,
            }),
        }
    }

    /// Fire the token. The first reason wins; later calls are no-ops.
    /// Returns whether this call fired the token.
    pub fn abort(&self, reason: Option<DispatchError>) -> bool {
        let mut slot = self.shared.reason.lock().unwrap();
        if *self.shared.tx.borrow() {
            return false;
        }
        *slot = reason;
        let _ = self.shared.tx.send(true);
        true
    }

    pub fn is_aborted(&self) -> bool {
        *self.shared.tx.borrow()
    }

    /// The abort reason, when one was given.
    pub fn reason(&self) -> Option<DispatchError> {
        self.shared.reason.lock().unwrap().clone()
    }

    /// Resolves once the token fires. Resolves immediately when it already
    /// has.
    pub async fn fired(&self) {
        let mut rx = self.shared.tx.subscribe();
        if *rx.borrow() {
            return;
        }
        // The sender lives in the shared state we hold, so `changed` only
        // errors if the session was torn down without firing.
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}
