//! Resilience core: circuit breakers, retries and error statistics for
//! wrapping calls to unreliable dependencies.

pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use admin::MonitoringFacade;
pub use config::ResilienceConfig;
pub use lifecycle::{Services, Shutdown};
pub use resilience::{
    BreakerSettings, CircuitBreakerRegistry, CircuitState, ErrorStatistics, RetryError,
    RetryExecutor, RetryPolicy,
};
