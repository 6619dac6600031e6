//! Request-level concerns shared by every route.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for tracing
//! - Count in-flight requests so shutdown can wait for them
//! - Interrupt tracked requests when shutdown is forced
//!
//! # Design Decisions
//! - Request ID added as early as possible (outermost layer)
//! - The in-flight counter is a watch channel so drain waits without polling

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::watch;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::lifecycle::shutdown::{Shutdown, ShutdownListener};
use crate::observability::metrics;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Produces a fresh UUID v4 for every request lacking one.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdGenerator;

impl MakeRequestId for RequestIdGenerator {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let value = HeaderValue::from_str(&Uuid::new_v4().to_string()).ok()?;
        Some(RequestId::new(value))
    }
}

/// Counts requests currently being handled.
#[derive(Debug, Clone)]
pub struct InFlightTracker {
    active: Arc<watch::Sender<usize>>,
    force: Shutdown,
}

impl InFlightTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            active: Arc::new(tx),
            force: Shutdown::new(),
        }
    }

    /// Record a new in-flight request. Returns a guard that decrements on drop.
    pub fn track(&self) -> InFlightGuard {
        self.active.send_modify(|n| *n += 1);
        metrics::set_in_flight(self.active());
        InFlightGuard {
            active: Arc::clone(&self.active),
        }
    }

    /// Current in-flight request count.
    pub fn active(&self) -> usize {
        *self.active.borrow()
    }

    /// Wait until no request is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Interrupt every tracked request, now and in the future.
    pub fn force(&self) {
        self.force.trigger();
    }

    pub(crate) fn force_listener(&self) -> ShutdownListener {
        self.force.subscribe()
    }
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a request's lifetime.
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<watch::Sender<usize>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
        metrics::set_in_flight(*self.active.borrow());
    }
}

/// Middleware: count the request, record metrics, and give up when shutdown is forced.
pub async fn track_in_flight(
    State(tracker): State<InFlightTracker>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let _guard = tracker.track();
    let mut force = tracker.force_listener();

    let response = tokio::select! {
        response = next.run(request) => response,
        _ = force.recv() => {
            tracing::warn!(request_id = %request_id, "Request interrupted by forced shutdown");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    };

    metrics::record_request(&method, response.status().as_u16(), start);
    response
}
