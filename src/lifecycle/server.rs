//! Server lifecycle state machine.
//!
//! # Responsibilities
//! - Own the listener and the accept loop of one server instance
//! - Drive `Created → Starting → Listening → Stopping → Stopped` transitions
//! - Hand out one shared pending result per in-flight start or stop
//!
//! # Design Decisions
//! - `start()` and `stop()` answer synchronously with either an error or a
//!   pending result; the work itself runs on a spawned task, so it completes
//!   whether or not anyone awaits it
//! - Every transition happens under the `ops` lock, so a state observed
//!   together with the pending results is consistent
//! - Errors are `Clone` so every waiter of a shared result sees the same one

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

use crate::behavior::{Dispatcher, Fixtures};
use crate::config::validation::{validate_config, validate_host, validate_port};
use crate::config::{BehaviorConfig, ConfigError, FaultConfig, ListenerConfig};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::state::ServerState;
use crate::net::{ConnectionTracker, Listener, ListenerError};

/// Shared result of an in-flight lifecycle operation.
pub type Pending<T> = Shared<BoxFuture<'static, Result<T, ServerError>>>;

/// Resolves to the bound address once listening.
pub type PendingStart = Pending<SocketAddr>;

/// Resolves once the server has stopped.
pub type PendingStop = Pending<()>;

/// Lifecycle failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServerError {
    #[error("cannot start while {0}")]
    NotStartable(ServerState),

    #[error("cannot stop while {0}")]
    NotStoppable(ServerState),

    #[error(transparent)]
    Bind(Arc<ListenerError>),

    #[error("failed to close listener: {0}")]
    Close(Arc<io::Error>),

    #[error("lifecycle task did not complete: {0}")]
    Interrupted(Arc<JoinError>),
}

/// Validated construction options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
}

impl ServerOptions {
    /// Validate `host` and `port` together, reporting both when both are wrong.
    pub fn new(host: impl Into<String>, port: i64) -> Result<Self, ConfigError> {
        let host = host.into();
        let host_check = validate_host(&host);
        let port_check = validate_port(port);
        match (host_check, port_check) {
            (Ok(()), Ok(port)) => Ok(Self { host, port }),
            (host_check, port_check) => Err(ConfigError::Validation(
                host_check.err().into_iter().chain(port_check.err()).collect(),
            )),
        }
    }
}

/// One fault-injection server instance.
///
/// Must be started and stopped from within a Tokio runtime.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

struct Inner {
    options: ServerOptions,
    max_connections: usize,
    drain_timeout: Duration,
    behaviors: Arc<BehaviorConfig>,
    fixtures: Arc<Fixtures>,
    tracker: ConnectionTracker,
    state: watch::Sender<ServerState>,
    ops: Mutex<Ops>,
}

#[derive(Default)]
struct Ops {
    start: Option<PendingStart>,
    stop: Option<PendingStop>,
    local_addr: Option<SocketAddr>,
    running: Option<Running>,
}

struct Running {
    shutdown: Shutdown,
    accept: JoinHandle<()>,
}

impl Server {
    /// Validate `config` and build a server in the `Created` state.
    ///
    /// Nothing is bound until [`Server::start`].
    pub fn new(config: FaultConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let options = ServerOptions::new(config.listener.host.clone(), config.listener.port)?;
        Ok(Self::with_options(options, &config))
    }

    /// Build from already-validated options; listener settings other than
    /// host and port come from `config`.
    pub fn with_options(options: ServerOptions, config: &FaultConfig) -> Self {
        let ListenerConfig {
            max_connections,
            drain_timeout_secs,
            ..
        } = config.listener;
        let (state, _) = watch::channel(ServerState::Created);

        Self {
            inner: Arc::new(Inner {
                options,
                max_connections,
                drain_timeout: Duration::from_secs(drain_timeout_secs),
                behaviors: Arc::new(config.behaviors.clone()),
                fixtures: Arc::new(Fixtures::from_config(&config.fixtures)),
                tracker: ConnectionTracker::new(),
                state,
                ops: Mutex::new(Ops::default()),
            }),
        }
    }

    /// Begin listening.
    ///
    /// From `Created` or `Stopped` this starts binding; from `Starting` or
    /// `Listening` it returns the start already in flight.
    pub fn start(&self) -> Result<PendingStart, ServerError> {
        Inner::start(&self.inner)
    }

    /// Stop listening and drain open connections.
    ///
    /// From `Listening` this starts closing; from `Stopping` or `Stopped` it
    /// returns the stop already in flight.
    pub fn stop(&self) -> Result<PendingStop, ServerError> {
        Inner::stop(&self.inner)
    }

    pub fn state(&self) -> ServerState {
        *self.inner.state.borrow()
    }

    /// Watch every state transition from now on.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.inner.state.subscribe()
    }

    /// Bound address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.lock_ops().local_addr
    }

    /// Bound port while listening; the configured one otherwise.
    pub fn port(&self) -> u16 {
        self.local_addr().map_or(self.inner.options.port, |addr| addr.port())
    }

    pub fn active_connections(&self) -> usize {
        self.inner.tracker.active_count()
    }

    /// Weak handle for code that must not keep the server alive.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Weak reference to a [`Server`], held by the dispatcher for `/stop`.
#[derive(Clone)]
pub struct ServerHandle {
    inner: Weak<Inner>,
}

impl ServerHandle {
    /// Stop the server, or `None` if it has been dropped.
    pub fn stop(&self) -> Option<Result<PendingStop, ServerError>> {
        self.inner.upgrade().map(|inner| Inner::stop(&inner))
    }
}

impl Inner {
    fn lock_ops(&self) -> MutexGuard<'_, Ops> {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: ServerState) {
        let prev = self.state.send_replace(next);
        tracing::info!(from = %prev, to = %next, "Server state changed");
    }

    fn start(self: &Arc<Self>) -> Result<PendingStart, ServerError> {
        let mut ops = self.lock_ops();
        let state = *self.state.borrow();
        match (state, &ops.start) {
            (ServerState::Starting | ServerState::Listening, Some(pending)) => return Ok(pending.clone()),
            (ServerState::Created | ServerState::Stopped, _) => {}
            _ => return Err(ServerError::NotStartable(state)),
        }

        ops.stop = None;
        self.set_state(ServerState::Starting);
        let pending = spawn_shared(Arc::clone(self).bind(state));
        ops.start = Some(pending.clone());
        Ok(pending)
    }

    fn stop(self: &Arc<Self>) -> Result<PendingStop, ServerError> {
        let mut ops = self.lock_ops();
        let state = *self.state.borrow();
        match (state, &ops.stop) {
            (ServerState::Stopping | ServerState::Stopped, Some(pending)) => return Ok(pending.clone()),
            (ServerState::Listening, _) => {}
            _ => return Err(ServerError::NotStoppable(state)),
        }

        self.set_state(ServerState::Stopping);
        let running = ops.running.take();
        let pending = spawn_shared(Arc::clone(self).close(running));
        ops.stop = Some(pending.clone());
        Ok(pending)
    }

    async fn bind(self: Arc<Self>, prior: ServerState) -> Result<SocketAddr, ServerError> {
        let bound = Listener::bind(&self.options.host, self.options.port, self.max_connections).await;

        let listener = match bound {
            Ok(listener) => listener,
            Err(e) => {
                tracing::warn!(host = %self.options.host, port = self.options.port, error = %e, "Bind failed");
                let mut ops = self.lock_ops();
                ops.start = None;
                self.set_state(prior);
                return Err(ServerError::Bind(Arc::new(e)));
            }
        };

        let addr = listener.local_addr();
        let dispatcher = Dispatcher::new(Arc::clone(&self.behaviors), Arc::clone(&self.fixtures))
            .with_lifecycle(ServerHandle {
                inner: Arc::downgrade(&self),
            });
        let http = HttpServer::new(dispatcher, self.tracker.clone(), self.drain_timeout);
        let shutdown = Shutdown::new();
        let accept = tokio::spawn(http.run(listener, shutdown.subscribe()));

        let mut ops = self.lock_ops();
        ops.local_addr = Some(addr);
        ops.running = Some(Running { shutdown, accept });
        self.set_state(ServerState::Listening);
        tracing::info!(address = %addr, "Listening for connections");
        Ok(addr)
    }

    async fn close(self: Arc<Self>, running: Option<Running>) -> Result<(), ServerError> {
        let closed = match running {
            Some(Running { shutdown, accept }) => {
                shutdown.trigger();
                accept.await.map_err(|e| Arc::new(io::Error::other(e)))
            }
            None => Ok(()),
        };

        let mut ops = self.lock_ops();
        match closed {
            Ok(()) => {
                ops.start = None;
                ops.local_addr = None;
                self.set_state(ServerState::Stopped);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Close failed");
                ops.stop = None;
                self.set_state(ServerState::Listening);
                Err(ServerError::Close(e))
            }
        }
    }
}

fn spawn_shared<T, F>(work: F) -> Pending<T>
where
    T: Clone + Send + Sync + 'static,
    F: std::future::Future<Output = Result<T, ServerError>> + Send + 'static,
{
    let task = tokio::spawn(work);
    async move {
        task.await
            .unwrap_or_else(|e| Err(ServerError::Interrupted(Arc::new(e))))
    }
    .boxed()
    .shared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationError;

    fn config() -> FaultConfig {
        let mut config = FaultConfig::default();
        config.listener.port = 0;
        config.listener.drain_timeout_secs = 1;
        config
    }

    #[test]
    fn options_report_host_and_port_together() {
        match ServerOptions::new("bad_host", 70_000) {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(
                    errors,
                    vec![
                        ValidationError::InvalidHost("bad_host".into()),
                        ValidationError::InvalidPort(70_000),
                    ]
                );
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(
            ServerOptions::new("localhost", 0).unwrap(),
            ServerOptions {
                host: "localhost".into(),
                port: 0
            }
        );
    }

    #[tokio::test]
    async fn stop_before_start_is_refused() {
        let server = Server::new(config()).unwrap();
        assert!(matches!(
            server.stop(),
            Err(ServerError::NotStoppable(ServerState::Created))
        ));
    }

    #[tokio::test]
    async fn start_is_shared_while_in_flight() {
        let server = Server::new(config()).unwrap();
        let first = server.start().unwrap();
        let second = server.start().unwrap();
        assert!(Shared::ptr_eq(&first, &second));
        assert_eq!(server.state(), ServerState::Starting);

        let addr = first.await.unwrap();
        assert_eq!(server.state(), ServerState::Listening);
        assert_eq!(server.local_addr(), Some(addr));
        assert_eq!(server.port(), addr.port());

        let stop = server.stop().unwrap();
        assert!(matches!(
            server.start(),
            Err(ServerError::NotStartable(ServerState::Stopping))
        ));
        assert!(Shared::ptr_eq(&stop, &server.stop().unwrap()));
        stop.await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
        assert_eq!(server.local_addr(), None);
    }

    #[tokio::test]
    async fn dropped_server_handle_is_inert() {
        let server = Server::new(config()).unwrap();
        let handle = server.handle();
        assert!(matches!(
            handle.stop(),
            Some(Err(ServerError::NotStoppable(ServerState::Created)))
        ));
        drop(server);
        assert!(handle.stop().is_none());
    }
}
