//! Embeddable dual-protocol HTTP server.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌────────────────────────────────────────────────┐
//!                    │                  SWITCHBOARD                   │
//!                    │                                                │
//!   TCP / TLS        │  ┌─────────┐   ┌──────────┐   ┌─────────────┐ │
//!   ─────────────────┼─▶│   net   │──▶│   http   │──▶│   session   │ │
//!   (one port)       │  │ gateway │   │ h1 / h2  │   │  lifecycle  │ │
//!                    │  │ + sniff │   │ engines  │   └──────┬──────┘ │
//!                    │  └─────────┘   └──────────┘          │        │
//!                    │                                      ▼        │
//!                    │                              ┌─────────────┐  │
//!                    │                              │   routing   │  │
//!                    │                              └──────┬──────┘  │
//!                    │                                     │         │
//!   Response         │  ┌─────────┐   ┌──────────┐  ┌──────▼──────┐ │
//!   ◀────────────────┼──│  view   │◀──│ dispatch │◀─│    chain    │ │
//!                    │  │  model  │   │ handlers │  │   runner    │ │
//!                    │  └─────────┘   └──────────┘  └─────────────┘ │
//!                    │                                               │
//!                    │  Cross-cutting: config, observability, errors │
//!                    └───────────────────────────────────────────────┘
//! ```
//!
//! Every accepted connection is sniffed for the 24-byte HTTP/2 client
//! preface and handed to the matching protocol engine. Each request becomes
//! a [`session::Session`] whose dispatcher chain mutates a strict
//! [`view::View`] to produce the response.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use switchboard::{Server, ServerConfig, RouteTable, Route};
//! use switchboard::dispatch::FnDispatcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hello = Arc::new(FnDispatcher::new(|_request, session| {
//!         session.view.merge_body(serde_json::json!({ "hello": "world" }));
//!         Ok(())
//!     }));
//!
//!     let mut routes = RouteTable::new();
//!     routes.define("/hello", Route::new().on("method.*", hello));
//!
//!     let server = Server::bootstrap(ServerConfig::default(), routes)?;
//!     server.listen(Some(8080)).await?;
//!     Ok(())
//! }
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Request machinery
pub mod dispatch;
pub mod session;
pub mod view;

// Cross-cutting concerns
pub mod error;
pub mod observability;

pub use config::{LogConfig, RouterConfig, ServerConfig, TransportConfig};
pub use dispatch::{Dispatcher, FnDispatcher};
pub use error::{Cause, DispatchError, ErrorKind, ServerError};
pub use http::request::Request;
pub use net::gateway::Server;
pub use routing::{Route, RouteTable};
pub use session::{Session, Stats, StatsSnapshot};
pub use view::{SseStream, View};
