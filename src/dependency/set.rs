//! Ordered acquisition and LIFO release of dependency handles.

use std::slice;
use std::sync::Arc;

use thiserror::Error;

use crate::config::AppConfig;
use crate::dependency::handle::{Dependency, Handle, HandleError, OpenError};
use crate::observability::metrics;

/// A dependency failed to open. Handles opened before it were already released.
#[derive(Debug, Error)]
#[error("failed to open dependency `{name}`: {source}")]
pub struct DependencyOpenError {
    pub name: String,
    #[source]
    pub source: OpenError,
    /// Outcome of releasing the dependencies opened before the failure.
    pub rollback: ReleaseReport,
}

/// A handle that failed to close.
#[derive(Debug)]
pub struct ReleaseFailure {
    pub name: String,
    pub error: HandleError,
}

/// Result of releasing a set of handles.
#[derive(Debug, Default)]
pub struct ReleaseReport {
    /// Names of every handle a close was attempted on, in close order.
    pub closed: Vec<String>,
    /// Handles whose close reported an error.
    pub failures: Vec<ReleaseFailure>,
}

impl ReleaseReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Read-only, ordered view of the open handles.
///
/// Cloned into request handlers; cloning only bumps reference counts.
#[derive(Debug, Clone)]
pub struct Handles {
    inner: Arc<[Arc<dyn Handle>]>,
}

impl Handles {
    /// Look a handle up by dependency name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Handle>> {
        self.inner.iter().find(|h| h.name() == name)
    }

    /// Look a handle up by name and borrow it as its concrete type.
    ///
    /// Returns `None` when no handle has that name or it is a different type.
    pub fn get_as<T: Handle + 'static>(&self, name: &str) -> Option<&T> {
        self.get(name)?.as_any().downcast_ref::<T>()
    }

    pub fn iter(&self) -> slice::Iter<'_, Arc<dyn Handle>> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl FromIterator<Arc<dyn Handle>> for Handles {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Handle>>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

/// Handles opened in declared order, owned by the orchestrator.
///
/// Every handle is closed exactly once by [`DependencySet::release`], in
/// reverse acquisition order.
#[derive(Debug)]
pub struct DependencySet {
    handles: Vec<Arc<dyn Handle>>,
    released: bool,
}

impl DependencySet {
    /// Open every dependency in order.
    ///
    /// On the first failure the already-opened handles are closed in reverse
    /// order before the error is returned; later dependencies are never opened.
    pub async fn open_all(
        dependencies: &[Box<dyn Dependency>],
        config: &AppConfig,
    ) -> Result<Self, DependencyOpenError> {
        let mut set = Self {
            handles: Vec::with_capacity(dependencies.len()),
            released: false,
        };

        for dependency in dependencies {
            let name = dependency.name();
            tracing::info!(dependency = name, "Opening dependency");

            match dependency.open(config).await {
                Ok(handle) => {
                    metrics::record_dependency_open(name, true);
                    tracing::info!(dependency = name, "Dependency ready");
                    set.handles.push(handle);
                }
                Err(source) => {
                    metrics::record_dependency_open(name, false);
                    tracing::error!(dependency = name, error = %source, "Failed to open dependency");
                    let rollback = set.release().await;
                    return Err(DependencyOpenError {
                        name: name.to_string(),
                        source,
                        rollback,
                    });
                }
            }
        }

        Ok(set)
    }

    /// Shared view for request handlers.
    pub fn handles(&self) -> Handles {
        self.handles.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Close every handle in reverse acquisition order.
    ///
    /// Keeps going past failures; all of them are logged and reported.
    pub async fn release(mut self) -> ReleaseReport {
        self.released = true;
        let mut report = ReleaseReport::default();

        while let Some(handle) = self.handles.pop() {
            let name = handle.name().to_string();
            match handle.close().await {
                Ok(()) => tracing::info!(dependency = %name, "Dependency released"),
                Err(error) => {
                    tracing::error!(dependency = %name, error = %error, "Failed to release dependency");
                    report.failures.push(ReleaseFailure {
                        name: name.clone(),
                        error,
                    });
                }
            }
            report.closed.push(name);
        }

        report
    }
}

impl Drop for DependencySet {
    fn drop(&mut self) {
        if !self.released && !self.handles.is_empty() {
            let names: Vec<&str> = self.handles.iter().map(|h| h.name()).collect();
            tracing::error!(dependencies = ?names, "Dependency set dropped without release");
        }
    }
}
