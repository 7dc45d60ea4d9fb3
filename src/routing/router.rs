//! Route resolution and chain execution for one request.

#[cfg(test)]
use std::sync::Arc;

use crate::dispatch::chain::run_chain;
use crate::error::{DispatchError, ErrorKind};
use crate::http::request::Request;
use crate::routing::RouteTable;
use crate::session::Session;

/// Resolves requests against the route table and runs their chains.
pub struct Router {
    table: RouteTable,
}

impl Router {
    pub fn new(table: RouteTable) -> Self {
        Router { table }
    }

    /// Resolve the request's criteria, seed the session's chain from the
    /// route, and run it.
    ///
    /// A criteria miss fails with NoRoute (404). A dispatcher rejection is
    /// wrapped in DispatchFailed with the dispatcher's error as its cause.
    pub async fn dispatch(
        &self,
        request: &mut Request,
        session: &mut Session,
    ) -> Result<(), DispatchError> {
        let route = self.table.resolve(request.criteria()).ok_or_else(|| {
            DispatchError::kind(
                ErrorKind::NoRoute,
                format!("no route matches '{}'", request.criteria()),
            )
            .with_status(404)
        })?;

        session.bind_route(route.clone());
        session.chain = route.seed_chain();

        run_chain(request, session).await.map_err(|cause| {
            DispatchError::kind(ErrorKind::DispatchFailed, "a dispatcher rejected the request")
                .with_cause(cause)
        })
    }
}
