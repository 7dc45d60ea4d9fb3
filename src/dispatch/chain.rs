//! The per-request dispatcher chain.
//!
//! # Responsibilities
//! - Hold the ordered dispatcher list and the execution cursor
//! - Allow insertion immediately after the cursor during traversal
//! - Enforce the no-duplicates invariant at splice time
//!
//! # Design Decisions
//! - Dedup is by `Arc` identity, the same handler object never runs twice
//!   for one request however middleware splices it in
//! - The cursor only moves forward; splicing is the only structural
//!   mutation permitted while the chain runs

use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::error::DispatchError;
use crate::http::request::Request;
use crate::session::Session;

/// Ordered dispatcher list plus the execution cursor.
#[derive(Default)]
pub struct Chain {
    dispatchers: Vec<Arc<dyn Dispatcher>>,
    index: usize,
}

impl Chain {
    pub fn new() -> Self {
        Chain::default()
    }

    pub(crate) fn seed(dispatchers: Vec<Arc<dyn Dispatcher>>) -> Self {
        Chain {
            dispatchers,
            index: 0,
        }
    }

    /// Position of the next dispatcher to run.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }

    /// Insert dispatchers immediately after the one currently running.
    ///
    /// Candidates already present anywhere in the chain are dropped, so a
    /// handler can never appear twice however middleware routes to it.
    /// Returns how many dispatchers were actually inserted.
    pub fn splice_after_cursor(&mut self, dispatchers: &[Arc<dyn Dispatcher>]) -> usize {
        let mut inserted = 0;
        for dispatcher in dispatchers {
            let duplicate = self
                .dispatchers
                .iter()
                .any(|existing| Arc::ptr_eq(existing, dispatcher));
            if duplicate {
                continue;
            }
            self.dispatchers
                .insert(self.index + inserted, dispatcher.clone());
            inserted += 1;
        }
        inserted
    }

    /// Take the dispatcher under the cursor and advance past it.
    fn advance(&mut self) -> Option<Arc<dyn Dispatcher>> {
        let dispatcher = self.dispatchers.get(self.index).cloned()?;
        self.index += 1;
        Some(dispatcher)
    }
}

/// Run the session's chain to completion.
///
/// Dispatchers execute strictly in order; a splice after the cursor is
/// observed by the very next step. Execution stops when the cursor passes
/// the last element, when the abortion token fires, or when a dispatcher
/// fails.
pub(crate) async fn run_chain(
    request: &mut Request,
    session: &mut Session,
) -> Result<(), DispatchError> {
    loop {
        if session.abortion.is_aborted() {
            return Ok(());
        }
        let Some(dispatcher) = session.chain.advance() else {
            return Ok(());
        };
        dispatcher.dispatch(request, session).await?;
    }
}
