//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resilience_core::admin;
use resilience_core::config::ResilienceConfig;
use resilience_core::{Services, Shutdown};
use tokio::net::TcpListener;

/// Test-profile settings: threshold 3, 5s open timeout, two quick retries.
#[allow(dead_code)]
pub fn test_config() -> ResilienceConfig {
    let mut config = ResilienceConfig::default();
    config.circuit_breaker.failure_threshold = 3;
    config.circuit_breaker.open_timeout_ms = 5000;
    config.retry.max_attempts = 2;
    config.retry.initial_delay_ms = 100;
    config.retry.jitter_factor = 0.0;
    config.observability.metrics_enabled = false;
    config
}

/// Bind the admin router to an ephemeral port and serve it in the background.
#[allow(dead_code)]
pub async fn start_admin_server(services: &Services) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let facade = services.facade();
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = admin::serve(listener, facade, &server_shutdown).await;
    });

    // let the accept loop start
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}

#[allow(dead_code)]
pub fn api_url(addr: SocketAddr, path: &str) -> String {
    format!("http://{}{}{}", addr, admin::API_PREFIX, path)
}

#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Operation that fails its first `failures` invocations, then succeeds.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct Flaky {
    calls: Arc<AtomicU32>,
    failures: u32,
}

#[allow(dead_code)]
impl Flaky {
    pub fn failing_first(failures: u32) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            failures,
        }
    }

    pub fn call(&self) -> Result<String, String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            Err(format!("connection refused (call {n})"))
        } else {
            Ok("Success".to_string())
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}
