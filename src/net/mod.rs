//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limits)
//!     → connection.rs (id for the connection's tracing span)
//!     → Hand off to HTTP layer (http::server)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Connection slots are released by dropping the permit

pub mod connection;
pub mod listener;
