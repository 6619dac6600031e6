//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::listener)
//!     → server.rs (hyper-util auto HTTP/1 + HTTP/2, graceful watch)
//!     → request.rs (request ID, in-flight tracking, interrupt on force)
//!     → application Router (health.rs by default)
//!     → Send to client
//! ```

pub mod health;
pub mod request;
pub mod server;

pub use request::{InFlightTracker, RequestIdGenerator, X_REQUEST_ID};
pub use server::{Drained, RuntimeError, RuntimeState, ServiceRuntime, ShutdownError, ShutdownResult};
