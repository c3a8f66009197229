//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build registry, collector, executor → Serve admin
//!
//! Reload (startup.rs):
//!     ConfigWatcher update → swap breaker defaults/overrides and retry policy
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGINT/SIGTERM → Shutdown::trigger → admin server drains → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core components, then the listener
//! - One broadcast coordinator; every long-running task subscribes

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::Services;
