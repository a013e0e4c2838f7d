//! HTTP server: accept loop and per-connection serving.
//!
//! # Responsibilities
//! - Accept connections from the bounded listener
//! - Serve HTTP/1.1 on each connection through the dispatcher
//! - Wrap every request in a `TraceLayer` span
//! - On shutdown, stop accepting and drain open connections
//!
//! # Design Decisions
//! - Connections are plain hyper `http1` connections rather than a router:
//!   the dispatcher owns path matching and needs to answer some requests by
//!   dropping the connection
//! - Draining asks each connection to finish its in-flight response, then
//!   aborts whatever is still open after the drain timeout

use std::net::SocketAddr;
use std::pin::pin;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tower::{service_fn, ServiceBuilder};
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use tracing::Level;

use crate::behavior::Dispatcher;
use crate::lifecycle::ShutdownSignal;
use crate::net::{ConnectionGuard, ConnectionPermit, ConnectionTracker, Listener, ListenerError};

/// Pause after a failed accept so a persistent error (e.g. out of file
/// descriptors) does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// HTTP server for one bound listener.
pub struct HttpServer {
    dispatcher: Dispatcher,
    tracker: ConnectionTracker,
    drain_timeout: Duration,
}

impl HttpServer {
    pub fn new(dispatcher: Dispatcher, tracker: ConnectionTracker, drain_timeout: Duration) -> Self {
        Self {
            dispatcher,
            tracker,
            drain_timeout,
        }
    }

    /// Accept and serve until `shutdown` fires, then drain.
    ///
    /// The listener is closed as soon as shutdown begins, so the port is free
    /// again even while connections are still draining.
    pub async fn run(self, listener: Listener, mut shutdown: ShutdownSignal) {
        let addr = listener.local_addr();
        tracing::info!(address = %addr, "HTTP server starting");

        let conn_shutdown = shutdown.clone();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let guard = self.tracker.track();
                        connections.spawn(serve_connection(
                            self.dispatcher.clone(),
                            stream,
                            peer,
                            conn_shutdown.clone(),
                            guard,
                            permit,
                        ));
                    }
                    Err(ListenerError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        tracing::info!(address = %addr, open = connections.len(), "Listener closed, draining connections");

        let drained = tokio::time::timeout(self.drain_timeout, self.tracker.wait_idle()).await;
        if drained.is_err() {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                timeout_secs = self.drain_timeout.as_secs_f64(),
                "Drain timeout reached, aborting connections"
            );
        }
        // Reaps finished tasks and aborts whatever outlived the deadline.
        connections.shutdown().await;

        tracing::info!(address = %addr, "HTTP server stopped");
    }
}

async fn serve_connection(
    dispatcher: Dispatcher,
    stream: TcpStream,
    peer: SocketAddr,
    mut shutdown: ShutdownSignal,
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
) {
    let id = guard.id();
    let service = ServiceBuilder::new()
        // Silent and noisy drops surface as failures; they are expected here.
        .layer(TraceLayer::new_for_http().on_failure(DefaultOnFailure::new().level(Level::DEBUG)))
        .service(service_fn(move |request: Request<Incoming>| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.dispatch(request).await }
        }));

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(service));
    let mut conn = pin!(conn);
    let mut draining = false;

    let result = loop {
        tokio::select! {
            result = conn.as_mut() => break result,
            _ = shutdown.recv(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    };

    // Deliberate drops by the silent and noisy behaviors end up here too.
    match result {
        Ok(()) => tracing::trace!(connection_id = %id, peer_addr = %peer, "Connection finished"),
        Err(e) => tracing::debug!(connection_id = %id, peer_addr = %peer, error = %e, "Connection ended abruptly"),
    }
}
