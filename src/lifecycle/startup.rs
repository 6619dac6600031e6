//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Open dependencies in declared order
//! - Bind the listener and begin accepting traffic
//! - Wait for the termination signal, drain, release dependencies
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and nothing is left running
//! - Dependencies open in order, not concurrently, and close in reverse
//! - The runtime is stopped before any dependency is released
//! - Shutdown problems are logged, never turned into a failing exit

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tokio::sync::watch;

use crate::config::{AppConfig, ConfigError, ConfigProvider};
use crate::dependency::{Dependency, DependencyOpenError, DependencySet, Handles, ReleaseReport};
use crate::http::server::{RuntimeError, ServiceRuntime, ShutdownResult};
use crate::lifecycle::shutdown::Shutdown;

/// Builds the application routes once dependencies are open.
pub type RouterFactory = Arc<dyn Fn(&AppConfig, Handles) -> Router + Send + Sync>;

/// Fatal startup failures. Each maps to its own exit code.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dependency(#[from] DependencyOpenError),

    #[error("failed to start service runtime: {0}")]
    Runtime(#[from] RuntimeError),
}

impl StartupError {
    /// Process exit code (sysexits.h values).
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    pub fn code(&self) -> u8 {
        match self {
            StartupError::Config(_) => 78,
            StartupError::Dependency(_) => 69,
            StartupError::Runtime(_) => 74,
        }
    }
}

/// Coarse process phase, observable through [`Orchestrator::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Starting,
    Running(SocketAddr),
    ShuttingDown,
    Stopped,
    Failed,
}

/// Outcome of a run that reached the Running phase.
#[derive(Debug)]
pub struct LifecycleReport {
    /// Address the runtime was bound to.
    pub address: SocketAddr,
    /// Drain result; a forced shutdown is still a normal exit.
    pub shutdown: ShutdownResult,
    /// Release outcome for every dependency, in close order.
    pub release: ReleaseReport,
}

/// Drives config → dependencies → runtime → signal → drain → release.
pub struct Orchestrator {
    provider: Box<dyn ConfigProvider>,
    dependencies: Vec<Box<dyn Dependency>>,
    router: RouterFactory,
    phase: watch::Sender<LifecyclePhase>,
}

impl Orchestrator {
    pub fn builder(provider: impl ConfigProvider + 'static) -> OrchestratorBuilder {
        OrchestratorBuilder {
            provider: Box::new(provider),
            dependencies: Vec::new(),
            router: None,
        }
    }

    /// Observe phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecyclePhase> {
        self.phase.subscribe()
    }

    /// Run the full lifecycle until `shutdown` fires and cleanup finishes.
    ///
    /// Returns `Err` only for failures before the runtime was serving.
    pub async fn run(self, shutdown: Shutdown) -> Result<LifecycleReport, StartupError> {
        let result = self.run_inner(shutdown).await;
        let phase = if result.is_ok() {
            LifecyclePhase::Stopped
        } else {
            LifecyclePhase::Failed
        };
        self.phase.send_replace(phase);
        result
    }

    async fn run_inner(&self, shutdown: Shutdown) -> Result<LifecycleReport, StartupError> {
        self.phase.send_replace(LifecyclePhase::Starting);

        let config = self.provider.load().inspect_err(|e| {
            tracing::error!(error = %e, "Failed to load configuration");
        })?;
        tracing::info!(
            host = %config.server.host,
            port = config.server.port,
            shutdown_timeout_secs = config.server.shutdown_timeout_secs,
            dependencies = self.dependencies.len(),
            "Configuration loaded"
        );

        let dependencies = DependencySet::open_all(&self.dependencies, &config).await?;

        let served = self.serve(&config, dependencies.handles(), shutdown).await;

        // Runs on every path past this point, after the runtime stopped dispatching.
        tracing::info!(dependencies = dependencies.len(), "Releasing dependencies");
        let release = dependencies.release().await;
        if !release.is_clean() {
            tracing::warn!(failures = release.failures.len(), "Some dependencies failed to release");
        }

        let (address, shutdown) = served?;
        Ok(LifecycleReport {
            address,
            shutdown,
            release,
        })
    }

    async fn serve(
        &self,
        config: &AppConfig,
        handles: Handles,
        shutdown: Shutdown,
    ) -> Result<(SocketAddr, ShutdownResult), StartupError> {
        let router = (self.router)(config, handles);
        let runtime = ServiceRuntime::new(config.server.clone(), router);

        let address = runtime.start().await.inspect_err(|e| {
            tracing::error!(error = %e, "Failed to start service runtime");
        })?;
        self.phase.send_replace(LifecyclePhase::Running(address));
        tracing::info!(address = %address, "Service running, waiting for termination signal");

        shutdown.wait().await;
        self.phase.send_replace(LifecyclePhase::ShuttingDown);
        tracing::info!("Shutting down service runtime");

        let result = runtime.shutdown(config.server.shutdown_timeout()).await;
        match &result {
            Ok(drained) => tracing::info!(
                elapsed_ms = drained.elapsed.as_millis() as u64,
                "Drained cleanly"
            ),
            Err(e) if e.is_forced() => tracing::warn!(error = %e, "Forced after deadline"),
            Err(e) => tracing::error!(error = %e, "Service runtime shutdown failed"),
        }

        Ok((address, result))
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    provider: Box<dyn ConfigProvider>,
    dependencies: Vec<Box<dyn Dependency>>,
    router: Option<RouterFactory>,
}

impl OrchestratorBuilder {
    /// Append a dependency. Dependencies open in the order they are added.
    pub fn dependency(mut self, dependency: impl Dependency + 'static) -> Self {
        self.dependencies.push(Box::new(dependency));
        self
    }

    /// Set the application routes. Defaults to an empty router.
    pub fn router<F>(mut self, factory: F) -> Self
    where
        F: Fn(&AppConfig, Handles) -> Router + Send + Sync + 'static,
    {
        self.router = Some(Arc::new(factory));
        self
    }

    pub fn build(self) -> Orchestrator {
        let (phase, _) = watch::channel(LifecyclePhase::Starting);
        Orchestrator {
            provider: self.provider,
            dependencies: self.dependencies,
            router: self.router.unwrap_or_else(|| Arc::new(empty_router)),
            phase,
        }
    }
}

fn empty_router(_config: &AppConfig, _handles: Handles) -> Router {
    Router::new()
}
