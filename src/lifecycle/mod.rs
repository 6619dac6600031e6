//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Open dependencies in order → Start runtime
//!
//! Run:
//!     Wait for Shutdown (shutdown.rs), fired by signals.rs
//!
//! Shutdown (startup.rs → http::server):
//!     Stop accepting → Drain requests (deadline) → Release dependencies in reverse
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown, once
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then dependencies, then listener
//! - Ordered shutdown: stop accept, drain, release
//! - Shutdown has timeout: forced termination after deadline, still exit 0

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownListener};
pub use startup::{LifecyclePhase, LifecycleReport, Orchestrator, OrchestratorBuilder, StartupError};
