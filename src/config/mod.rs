//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (SERVICE_* environment overrides)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → provider.rs hands it to the lifecycle orchestrator
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults except dependency URLs, which must be set
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod provider;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use provider::{ConfigProvider, FileConfigProvider, StaticConfigProvider};
pub use schema::{AppConfig, CacheConfig, DatabaseConfig, ServerConfig};
pub use validation::ValidationError;
