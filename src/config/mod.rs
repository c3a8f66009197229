//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, RESILIENCE_* overrides)
//!     → validation.rs (semantic checks)
//!     → ResilienceConfig (validated, immutable)
//!     → converted into BreakerSettings / RetryPolicy at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → breaker defaults, overrides and retry policy swapped (arc-swap)
//!     → existing breaker records keep their settings until reset
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, BreakerOverride, CircuitBreakerConfig, ObservabilityConfig, ResilienceConfig,
    RetryConfig,
};
