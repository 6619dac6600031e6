//! HTTP service runtime.
//!
//! # Responsibilities
//! - Bind the listener and run the accept loop on its own task
//! - Serve HTTP/1.1 and HTTP/2 connections with an Axum router
//! - Wire up middleware (request ID, tracing, timeout, in-flight tracking)
//! - Drain in-flight work on shutdown, bounded by a deadline
//!
//! # State Machine
//! ```text
//! Unstarted --start()--> Running --shutdown()--> ShuttingDown --(drained | deadline)--> Stopped
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::middleware::from_fn_with_state;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use thiserror::Error;
use tokio::sync::{watch, OnceCell};
use tokio::task::{JoinHandle, JoinSet};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::http::request::{track_in_flight, InFlightTracker, RequestIdGenerator};
use crate::lifecycle::shutdown::{Shutdown, ShutdownListener};
use crate::net::connection::ConnectionId;
use crate::net::listener::{Listener, ListenerError};
use crate::observability::metrics;

/// How long forcibly terminated work gets to unwind before its task is aborted.
const FORCE_GRACE: Duration = Duration::from_millis(500);

/// Lifecycle state of a [`ServiceRuntime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Unstarted,
    Running,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeState::Unstarted => "unstarted",
            RuntimeState::Running => "running",
            RuntimeState::ShuttingDown => "shutting down",
            RuntimeState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Errors from [`ServiceRuntime::start`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("cannot {action} a runtime that is {from}")]
    InvalidTransition {
        from: RuntimeState,
        action: &'static str,
    },
}

/// Shutdown drained every connection and request before the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drained {
    pub elapsed: Duration,
}

/// Errors from [`ServiceRuntime::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShutdownError {
    /// Work was still outstanding at the deadline and was terminated.
    #[error("forced shutdown after {deadline:?}: {interrupted} request(s) interrupted")]
    Forced {
        deadline: Duration,
        interrupted: usize,
    },

    #[error("cannot shut down a runtime that is {from}")]
    InvalidTransition { from: RuntimeState },

    /// The accept loop task failed.
    #[error("runtime task failed: {0}")]
    Task(String),
}

impl ShutdownError {
    pub fn is_forced(&self) -> bool {
        matches!(self, ShutdownError::Forced { .. })
    }
}

pub type ShutdownResult = Result<Drained, ShutdownError>;

/// The listening endpoint plus its dispatch machinery.
///
/// `start` and `shutdown` take `&self`, so the runtime can be shared behind
/// an `Arc`. The shutdown result is computed once and memoized.
pub struct ServiceRuntime {
    config: ServerConfig,
    router: Mutex<Option<Router>>,
    state: watch::Sender<RuntimeState>,
    tracker: InFlightTracker,
    stop: Shutdown,
    serve_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    result: OnceCell<ShutdownResult>,
}

impl ServiceRuntime {
    /// Create an unstarted runtime serving `router`.
    pub fn new(config: ServerConfig, router: Router) -> Self {
        let (state, _) = watch::channel(RuntimeState::Unstarted);
        Self {
            config,
            router: Mutex::new(Some(router)),
            state,
            tracker: InFlightTracker::new(),
            stop: Shutdown::new(),
            serve_task: tokio::sync::Mutex::new(None),
            result: OnceCell::new(),
        }
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<RuntimeState> {
        self.state.subscribe()
    }

    /// Requests currently being handled.
    pub fn in_flight(&self) -> usize {
        self.tracker.active()
    }

    /// Bind the listener and start dispatching on a background task.
    ///
    /// Returns once the endpoint accepts connections.
    pub async fn start(&self) -> Result<SocketAddr, RuntimeError> {
        let mut serve_task = self.serve_task.lock().await;

        let from = self.state();
        if from != RuntimeState::Unstarted {
            return Err(RuntimeError::InvalidTransition { from, action: "start" });
        }
        // Bind before taking the router so a failed bind can be retried.
        let listener = Listener::bind(&self.config).await?;
        let addr = listener.local_addr();
        let router = self
            .router
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .ok_or(RuntimeError::InvalidTransition { from, action: "start" })?;
        let app = self.wrap(router);

        *serve_task = Some(tokio::spawn(serve(
            listener,
            app,
            self.tracker.clone(),
            self.stop.subscribe(),
        )));
        self.state.send_replace(RuntimeState::Running);

        tracing::info!(address = %addr, "HTTP server started");
        Ok(addr)
    }

    /// Stop accepting, drain in-flight work, force termination at `deadline`.
    ///
    /// Concurrent and repeated calls return the first call's result without
    /// draining again.
    pub async fn shutdown(&self, deadline: Duration) -> ShutdownResult {
        let from = self.state();
        if from == RuntimeState::Unstarted {
            return Err(ShutdownError::InvalidTransition { from });
        }

        self.result.get_or_init(|| self.drain(deadline)).await.clone()
    }

    async fn drain(&self, deadline: Duration) -> ShutdownResult {
        let started = Instant::now();
        self.state.send_replace(RuntimeState::ShuttingDown);
        tracing::info!(
            deadline_secs = deadline.as_secs_f64(),
            in_flight = self.tracker.active(),
            "Stopping listener and draining in-flight requests"
        );
        self.stop.trigger();

        let task = self.serve_task.lock().await.take();
        let result = match task {
            None => Ok(Drained {
                elapsed: started.elapsed(),
            }),
            Some(mut task) => match tokio::time::timeout(deadline, &mut task).await {
                Ok(joined) => joined
                    .map(|()| Drained {
                        elapsed: started.elapsed(),
                    })
                    .map_err(|e| ShutdownError::Task(e.to_string())),
                Err(_) => {
                    let interrupted = self.tracker.active();
                    self.tracker.force();
                    if tokio::time::timeout(FORCE_GRACE, &mut task).await.is_err() {
                        task.abort();
                        // Wait for the connection tasks to unwind before handles are released.
                        let _ = task.await;
                    }
                    Err(ShutdownError::Forced {
                        deadline,
                        interrupted,
                    })
                }
            },
        };

        self.state.send_replace(RuntimeState::Stopped);
        let elapsed = started.elapsed();
        metrics::record_shutdown(result.is_err(), elapsed);
        match &result {
            Ok(_) => tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "HTTP server drained"),
            Err(e) => tracing::warn!(elapsed_ms = elapsed.as_millis() as u64, error = %e, "HTTP server stopped"),
        }
        result
    }

    /// Apply the runtime's middleware stack around the application routes.
    #[allow(deprecated)]
    fn wrap(&self, router: Router) -> Router {
        router
            .layer(from_fn_with_state(self.tracker.clone(), track_in_flight))
            .layer(TimeoutLayer::new(self.config.request_timeout()))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(RequestIdGenerator))
    }
}

impl fmt::Debug for ServiceRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRuntime")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("in_flight", &self.tracker.active())
            .finish()
    }
}

impl Drop for ServiceRuntime {
    fn drop(&mut self) {
        self.stop.trigger();
        self.tracker.force();
        if let Some(task) = self.serve_task.get_mut().take() {
            tracing::warn!("Service runtime dropped while running, aborting accept loop");
            task.abort();
        }
    }
}

/// Accept loop. Returns once the listener is closed and every connection
/// and tracked request has finished, or once forced termination completes.
async fn serve(listener: Listener, app: Router, tracker: InFlightTracker, mut stop: ShutdownListener) {
    let builder = auto::Builder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = stop.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    let id = ConnectionId::next();
                    let service = TowerToHyperService::new(app.clone());
                    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
                    let conn = graceful.watch(conn.into_owned());
                    let span = tracing::debug_span!("connection", id = %id, peer = %peer);

                    connections.spawn(
                        async move {
                            let _permit = permit;
                            if let Err(e) = conn.await {
                                tracing::debug!(error = %e, "Connection ended with error");
                            }
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            Some(_) = connections.join_next() => {}
        }
    }

    let addr = listener.local_addr();
    drop(listener);
    tracing::info!(
        address = %addr,
        connections = connections.len(),
        in_flight = tracker.active(),
        "Listener closed"
    );

    let mut force = tracker.force_listener();
    tokio::select! {
        _ = async {
            graceful.shutdown().await;
            tracker.wait_idle().await;
        } => {
            tracing::debug!("All connections closed");
        }
        _ = force.recv() => {
            tracing::warn!(connections = connections.len(), "Aborting remaining connections");
            connections.abort_all();
        }
    }

    while connections.join_next().await.is_some() {}
}
