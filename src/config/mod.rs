//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or in-code defaults
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the server bootstraps
//! - All fields have defaults so an empty config is a working cleartext server
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{LogConfig, RouterConfig, ServerConfig, TransportConfig};
pub use validation::{validate_config, ValidationError};
