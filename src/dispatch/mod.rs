//! Dispatcher contract and bundled middleware.
//!
//! # Data Flow
//! ```text
//! Router resolves a route
//!     → chain.rs seeds and runs the dispatcher chain
//!     → negotiate.rs (method / accept / content-type selectors)
//!         splice the negotiated handlers in after themselves
//!     → body.rs (JSON decoder) replaces the request body
//!     → business dispatchers mutate the view
//! ```

pub mod body;
pub mod chain;
pub mod negotiate;
pub mod status;

use async_trait::async_trait;

use crate::error::DispatchError;
use crate::http::request::Request;
use crate::session::Session;

pub use body::JsonBody;
pub use chain::Chain;
pub use negotiate::{AcceptSelect, ContentTypeSelect, MethodSelect};
pub use status::StatusDispatcher;

/// A unit of request-handling logic.
///
/// A dispatcher may mutate `session.view`, replace `request.body`, splice
/// dispatchers in after the chain cursor, or abort the session. Returning
/// `Ok` yields control to the next dispatcher in the chain.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(
        &self,
        request: &mut Request,
        session: &mut Session,
    ) -> Result<(), DispatchError>;
}

/// Adapter wrapping a synchronous closure as a dispatcher.
pub struct FnDispatcher {
    handler: Box<dyn Fn(&mut Request, &mut Session) -> Result<(), DispatchError> + Send + Sync>,
}

impl FnDispatcher {
    pub fn new(
        handler: impl Fn(&mut Request, &mut Session) -> Result<(), DispatchError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        FnDispatcher {
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl Dispatcher for FnDispatcher {
    async fn dispatch(
        &self,
        request: &mut Request,
        session: &mut Session,
    ) -> Result<(), DispatchError> {
        (self.handler)(request, session)
    }
}
