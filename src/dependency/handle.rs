//! Dependency and handle contracts plus their error types.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::AppConfig;

/// Boxed backend error carried by dependency failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while opening a dependency.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The backend refused or dropped the connection.
    #[error("connection failed: {0}")]
    Connect(#[source] BoxError),

    /// The backend did not answer in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Connected, but the readiness probe failed.
    #[error("not ready: {0}")]
    NotReady(String),

    /// The parameters handed to the dependency are unusable.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

impl OpenError {
    pub fn connect(err: impl Into<BoxError>) -> Self {
        Self::Connect(err.into())
    }
}

/// Errors reported by an open handle.
#[derive(Debug, Error)]
pub enum HandleError {
    /// The handle was already closed.
    #[error("handle already closed")]
    Closed,

    /// The backend did not answer in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Backend error.
    #[error("backend error: {0}")]
    Backend(#[source] BoxError),
}

impl HandleError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        Self::Backend(err.into())
    }
}

/// An external system the service needs before it can serve traffic.
#[async_trait]
pub trait Dependency: Send + Sync {
    /// Name used in logs, metrics and [`super::Handles::get`].
    fn name(&self) -> &'static str;

    /// Open a ready-to-use handle, or fail. Never retries.
    async fn open(&self, config: &AppConfig) -> Result<Arc<dyn Handle>, OpenError>;
}

/// An open connection or session to a dependency.
///
/// A handle returned by [`Dependency::open`] is connected and ready.
#[async_trait]
pub trait Handle: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Concrete handle, for callers that need the backend client itself.
    fn as_any(&self) -> &dyn Any;

    /// Cheap readiness probe.
    async fn ping(&self) -> Result<(), HandleError>;

    /// Release the underlying resources. A second call reports [`HandleError::Closed`].
    async fn close(&self) -> Result<(), HandleError>;
}
