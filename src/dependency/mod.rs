//! External dependency subsystem.
//!
//! # Data Flow
//! ```text
//! AppConfig
//!     → Dependency::open (database.rs, cache.rs), in declared order
//!     → DependencySet (owns the handles, set.rs)
//!     → Handles (shared, read-only view for request handlers)
//!
//! On shutdown (after the runtime stopped dispatching):
//!     DependencySet::release → Handle::close, reverse order
//! ```
//!
//! # Design Decisions
//! - A handle either exists fully opened or not at all
//! - Open never retries; retry policy belongs to the backend client
//! - Release is best effort: errors are collected, never escalated

pub mod cache;
pub mod database;
pub mod handle;
pub mod set;

pub use cache::{CacheDependency, CacheHandle};
pub use database::{DatabaseDependency, DatabaseHandle};
pub use handle::{BoxError, Dependency, Handle, HandleError, OpenError};
pub use set::{DependencyOpenError, DependencySet, Handles, ReleaseFailure, ReleaseReport};
