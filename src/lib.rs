//! Service lifecycle library.
//!
//! Startup and shutdown orchestration for a network service: load
//! configuration, open dependencies in order, serve HTTP, and on a
//! termination signal drain in-flight work within a deadline before
//! releasing dependencies in reverse order.

pub mod config;
pub mod dependency;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::AppConfig;
pub use http::ServiceRuntime;
pub use lifecycle::{Orchestrator, Shutdown};
