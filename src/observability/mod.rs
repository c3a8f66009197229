//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breaker, retry and error collector produce:
//!     → logging.rs (tracing subscriber, env filter + fmt layer)
//!     → metrics.rs (counters and gauges through the metrics facade)
//!
//! Consumers:
//!     → stdout log stream
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Recording with no installed recorder is a no-op, so the library never requires one
//! - Labels are the service key, retry label, or component/operation pair
//! - `RUST_LOG` wins over the configured level

pub mod logging;
pub mod metrics;
