//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → gateway.rs (accept loop, state machine, graceful close)
//!     → tls.rs (optional rustls handshake, ALPN h2 + http/1.1)
//!     → sniff.rs (24-byte preface peek under a 1s deadline)
//!     → Hand off to the HTTP/1.1 or HTTP/2 engine
//! ```

pub mod gateway;
pub mod sniff;
pub mod tls;

pub use gateway::Server;
