//! Gateway multiplexer.
//!
//! # Responsibilities
//! - Own the single listening socket (TCP or TLS)
//! - Sniff each connection's first 24 bytes and route it to the matching
//!   protocol engine
//! - Track live HTTP/2 sessions for graceful shutdown
//! - Enforce the bootstrap state machine
//!
//! # State Machine
//! ```text
//! ┌─────────────┐ listen ┌───────────┐  close  ┌─────────┐     ┌────────┐
//! │ Bootstrapped│───────▶│ Listening │────────▶│ Closing │────▶│ Closed │
//! └─────────────┘        └───────────┘         └─────────┘     └────────┘
//! ```
//! `listen` is valid only from Bootstrapped, `close` only from Listening;
//! both fail NotAvailable otherwise.
//!
//! # Design Decisions
//! - Engines never accept from the listener; the gateway injects sniffed
//!   streams into them
//! - A connection that cannot produce 24 bytes within the sniff deadline
//!   is destroyed without ever reaching an engine
//! - Only h2 sessions are tracked for drain; h1 connections die with
//!   their sockets

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::config::{validate_config, ConfigError, ServerConfig};
use crate::error::ServerError;
use crate::net::sniff::{sniff, Protocol, SNIFF_TIMEOUT};
use crate::net::tls::build_acceptor;
use crate::observability::init_logging;
use crate::routing::{RouteTable, Router};
use crate::session::{Stats, StatsSnapshot};

/// Shared state handed to every connection task.
pub(crate) struct ServerContext {
    pub(crate) config: ServerConfig,
    pub(crate) router: Arc<Router>,
    pub(crate) stats: Arc<Stats>,
    pub(crate) tls: Option<TlsAcceptor>,
    sessions: DashMap<u64, SessionHandle>,
    session_seq: AtomicU64,
}

/// Registry entry for one live h2 session.
pub(crate) struct SessionHandle {
    close: watch::Sender<bool>,
    done: oneshot::Receiver<()>,
}

impl ServerContext {
    /// Track an h2 session; returns its registry key plus the signals the
    /// session task listens on and acknowledges through.
    pub(crate) fn register_session(&self) -> (u64, watch::Receiver<bool>, oneshot::Sender<()>) {
        let key = self.session_seq.fetch_add(1, Ordering::Relaxed);
        let (close_tx, close_rx) = watch::channel(false);
        let (done_tx, done_rx) = oneshot::channel();
        self.sessions.insert(
            key,
            SessionHandle {
                close: close_tx,
                done: done_rx,
            },
        );
        (key, close_rx, done_tx)
    }

    /// Remove a session that closed on its own.
    pub(crate) fn unregister_session(&self, key: u64) {
        self.sessions.remove(&key);
    }
}

enum State {
    Bootstrapped,
    Listening {
        stop: watch::Sender<bool>,
        accept: JoinHandle<()>,
        local_addr: SocketAddr,
    },
    Closing,
    Closed,
}

/// The embeddable server: one listening port, both HTTP protocols.
pub struct Server {
    state: Mutex<State>,
    context: Arc<ServerContext>,
}

impl Server {
    /// Validate config, initialize logging, and assemble the TLS acceptor
    /// when transport material is configured.
    pub fn bootstrap(config: ServerConfig, routes: RouteTable) -> Result<Server, ServerError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        init_logging(&config.log);

        let tls = if config.server.tls_enabled() {
            Some(build_acceptor(&config.server)?)
        } else {
            None
        };

        let context = Arc::new(ServerContext {
            router: Arc::new(Router::new(routes)),
            stats: Arc::new(Stats::new()),
            tls,
            sessions: DashMap::new(),
            session_seq: AtomicU64::new(0),
            config,
        });

        Ok(Server {
            state: Mutex::new(State::Bootstrapped),
            context,
        })
    }

    /// Bind the listener and start accepting. Valid only from the
    /// bootstrapped state; a bind failure rejects and leaves the state
    /// unchanged.
    pub async fn listen(&self, port: Option<u16>) -> Result<SocketAddr, ServerError> {
        let mut state = self.state.lock().await;
        if !matches!(*state, State::Bootstrapped) {
            return Err(ServerError::NotAvailable(
                "listen requires a bootstrapped server",
            ));
        }

        let mut addr: SocketAddr = self
            .context
            .config
            .server
            .bind_address
            .parse()
            .map_err(|e| {
                ServerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
            })?;
        if let Some(port) = port {
            addr.set_port(port);
        }

        let listener = TcpListener::bind(addr).await.map_err(ServerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ServerError::Bind)?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let accept = tokio::spawn(accept_loop(listener, self.context.clone(), stop_rx));

        tracing::info!(
            address = %local_addr,
            tls = self.context.tls.is_some(),
            "gateway listening"
        );

        *state = State::Listening {
            stop: stop_tx,
            accept,
            local_addr,
        };
        Ok(local_addr)
    }

    /// Stop accepting and drain every live h2 session. Valid only while
    /// listening.
    pub async fn close(&self) -> Result<(), ServerError> {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, State::Closing);
        let (stop, accept) = match previous {
            State::Listening { stop, accept, .. } => (stop, accept),
            other => {
                *state = other;
                return Err(ServerError::NotAvailable(
                    "close requires a listening server",
                ));
            }
        };

        // 1. Stop accepting new connections.
        let _ = stop.send(true);
        let _ = accept.await;

        // 2. Ask every tracked h2 session to close and wait for each
        //    acknowledgment. Sessions that already went away are skipped.
        let keys: Vec<u64> = self
            .context
            .sessions
            .iter()
            .map(|entry| *entry.key())
            .collect();
        for key in keys {
            if let Some((_, handle)) = self.context.sessions.remove(&key) {
                let _ = handle.close.send(true);
                let _ = handle.done.await;
            }
        }

        tracing::info!("gateway closed");
        *state = State::Closed;
        Ok(())
    }

    /// The bound address while listening.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.state.lock().await {
            State::Listening { local_addr, .. } => Some(*local_addr),
            _ => None,
        }
    }

    /// A snapshot of the lifecycle counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.context.stats.snapshot()
    }
}

async fn accept_loop(
    listener: TcpListener,
    context: Arc<ServerContext>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    let context = context.clone();
                    tokio::spawn(async move {
                        handle_connection(socket, peer, context).await;
                    });
                }
                // A failed accept never takes the loop down.
                Err(error) => {
                    tracing::warn!(error = %error, "accept failed");
                }
            }
        }
    }
    // Dropping the listener stops the kernel queue.
}

async fn handle_connection(socket: TcpStream, peer: SocketAddr, context: Arc<ServerContext>) {
    tracing::debug!(peer = %peer, "connection accepted");

    match context.tls.clone() {
        Some(acceptor) => match acceptor.accept(socket).await {
            Ok(stream) => sniff_and_serve(stream, context, "https", peer).await,
            Err(error) => {
                tracing::warn!(peer = %peer, error = %error, "TLS handshake failed");
            }
        },
        None => sniff_and_serve(socket, context, "http", peer).await,
    }
}

/// Classify the connection by preface and inject it into the matching
/// engine. The sniffed bytes are replayed, the engine observes a pristine
/// stream.
async fn sniff_and_serve<S>(
    stream: S,
    context: Arc<ServerContext>,
    scheme: &'static str,
    peer: SocketAddr,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    match tokio::time::timeout(SNIFF_TIMEOUT, sniff(stream)).await {
        // Deadline passed without 24 readable bytes: destroy the socket.
        Err(_) => {
            tracing::debug!(peer = %peer, "preface sniff timed out, destroying connection");
        }
        Ok(Err(error)) => {
            tracing::debug!(peer = %peer, error = %error, "preface sniff failed");
        }
        Ok(Ok((Protocol::H2, stream))) => {
            tracing::debug!(peer = %peer, "routing connection to the h2 engine");
            crate::http::h2::serve(stream, context, scheme).await;
        }
        Ok(Ok((Protocol::H1, stream))) => {
            tracing::debug!(peer = %peer, "routing connection to the h1 engine");
            crate::http::h1::serve(stream, context, scheme).await;
        }
    }
}
