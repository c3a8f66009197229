//! Startup orchestration and live reconfiguration.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::admin::MonitoringFacade;
use crate::config::ResilienceConfig;
use crate::lifecycle::Shutdown;
use crate::resilience::{CircuitBreakerRegistry, ErrorStatistics, RetryExecutor};

/// The process-wide resilience components, shared through `Arc`.
#[derive(Debug, Clone)]
pub struct Services {
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub errors: Arc<ErrorStatistics>,
    pub retries: Arc<RetryExecutor>,
}

impl Services {
    /// Build the collector first; the registry reports into it.
    pub fn from_config(config: &ResilienceConfig) -> Self {
        let errors = Arc::new(ErrorStatistics::new());

        let breakers = CircuitBreakerRegistry::new(config.circuit_breaker.default_settings())
            .with_error_statistics(Arc::clone(&errors));
        breakers.replace_overrides(config.circuit_breaker.override_settings());

        let retries = RetryExecutor::new(config.retry.to_policy());

        tracing::info!(
            failure_threshold = config.circuit_breaker.failure_threshold,
            open_timeout_ms = config.circuit_breaker.open_timeout_ms,
            overrides = config.circuit_breaker.overrides.len(),
            retry_max_attempts = config.retry.max_attempts,
            "Resilience components initialized"
        );

        Self {
            breakers: Arc::new(breakers),
            errors,
            retries: Arc::new(retries),
        }
    }

    pub fn facade(&self) -> MonitoringFacade {
        MonitoringFacade::new(
            Arc::clone(&self.breakers),
            Arc::clone(&self.errors),
            Arc::clone(&self.retries),
        )
    }

    /// Swap in reloaded settings. Existing breaker records keep theirs until reset.
    pub fn apply_config(&self, config: &ResilienceConfig) {
        self.breakers
            .update_defaults(config.circuit_breaker.default_settings());
        self.breakers
            .replace_overrides(config.circuit_breaker.override_settings());
        self.retries.set_default_policy(config.retry.to_policy());
    }

    /// Apply reloads from `updates` until shutdown or until the sender goes away.
    pub fn spawn_reload_loop(
        &self,
        mut updates: mpsc::UnboundedReceiver<ResilienceConfig>,
        shutdown: &Shutdown,
    ) -> JoinHandle<()> {
        let services = self.clone();
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = updates.recv() => match update {
                        Some(config) => {
                            services.apply_config(&config);
                            tracing::info!("Configuration reloaded");
                        }
                        None => break,
                    },
                    _ = stop.recv() => break,
                }
            }
            tracing::debug!("Config reload loop stopped");
        })
    }
}
