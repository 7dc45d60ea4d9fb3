//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Sniffed TCP/TLS connection
//!     → h1.rs (hyper http1 connection driver)  or
//!     → h2.rs (h2 handshake, one request per stream)
//!     → request.rs (request model, background body buffering)
//!     → [session runs the dispatcher chain]
//!     → transport.rs (staged head, single-shot or streaming body)
//!     → Send to client
//! ```

pub mod h1;
pub mod h2;
pub mod request;
pub(crate) mod transport;

pub use request::{Request, RequestBody};
