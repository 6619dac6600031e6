//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT)
//! - Translate the first signal into a [`Shutdown`] trigger
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are installed before startup so no signal is lost
//! - Repeated signals while shutting down are logged and ignored

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::Shutdown;

/// Install termination signal handlers and forward them to `shutdown`.
///
/// Fails only if the handlers cannot be registered with the OS.
pub fn install(shutdown: Shutdown) -> std::io::Result<JoinHandle<()>> {
    let mut signals = TerminationSignals::register()?;

    Ok(tokio::spawn(async move {
        loop {
            let name = signals.recv().await;
            if shutdown.trigger() {
                tracing::info!(signal = name, "Termination signal received, starting graceful shutdown");
            } else {
                tracing::warn!(signal = name, "Shutdown already in progress, ignoring signal");
            }
        }
    }))
}

#[cfg(unix)]
struct TerminationSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl TerminationSignals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(not(unix))]
struct TerminationSignals;

#[cfg(not(unix))]
impl TerminationSignals {
    fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl-C listener failed");
            std::future::pending::<()>().await;
        }
        "CTRL_C"
    }
}
