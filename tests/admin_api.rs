//! Admin API tests against a live listener.

use resilience_core::Services;
use serde_json::Value;

mod common;
use common::{api_url, client, start_admin_server, test_config};

async fn get_json(url: String) -> (u16, Value) {
    let res = client().get(url).send().await.expect("admin API unreachable");
    let status = res.status().as_u16();
    (status, res.json().await.unwrap())
}

async fn post_json(url: String) -> (u16, Value) {
    let res = client().post(url).send().await.expect("admin API unreachable");
    let status = res.status().as_u16();
    (status, res.json().await.unwrap())
}

fn trip(services: &Services, key: &str) {
    for _ in 0..3 {
        services
            .breakers
            .execute(key, || Err::<(), _>("connection refused"), || ());
    }
}

#[tokio::test]
async fn test_health_reports_degraded_breakers() {
    let services = Services::from_config(&test_config());
    let (addr, shutdown) = start_admin_server(&services).await;

    let (status, body) = get_json(api_url(addr, "/health")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "HEALTHY");
    assert_eq!(body["circuitBreakers"]["total"], 0);

    trip(&services, "orders");
    let (_, body) = get_json(api_url(addr, "/health")).await;
    assert_eq!(body["status"], "DEGRADED");
    assert_eq!(body["circuitBreakers"]["open"], 1);
    assert_eq!(body["circuitBreakers"]["statuses"]["orders"]["state"], "OPEN");
    assert_eq!(body["errors"]["totalErrorTypes"], 1);
    assert_eq!(body["errors"]["totalErrorCount"], 3);
    assert!(body["timestamp"].is_u64());

    shutdown.trigger();
}

#[tokio::test]
async fn test_breaker_status_and_reset() {
    let services = Services::from_config(&test_config());
    let (addr, shutdown) = start_admin_server(&services).await;
    trip(&services, "orders");

    let (status, body) = get_json(api_url(addr, "/circuit-breakers")).await;
    assert_eq!(status, 200);
    assert_eq!(body["orders"]["consecutiveFailures"], 3);

    let (_, body) = get_json(api_url(addr, "/circuit-breakers/orders")).await;
    assert_eq!(body["serviceName"], "orders");
    assert_eq!(body["state"], "OPEN");
    assert!(body["openedAt"].is_u64());

    let (_, body) = get_json(api_url(addr, "/circuit-breakers/unknown")).await;
    assert_eq!(body["state"], "CLOSED");
    assert_eq!(services.breakers.len(), 1);

    let (status, body) = post_json(api_url(addr, "/circuit-breakers/orders/reset")).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Circuit breaker reset successfully");
    assert_eq!(body["serviceName"], "orders");

    let (_, body) = get_json(api_url(addr, "/circuit-breakers/orders")).await;
    assert_eq!(body["state"], "CLOSED");
    assert_eq!(body["consecutiveFailures"], 0);
    assert!(body["openedAt"].is_null());

    shutdown.trigger();
}

#[tokio::test]
async fn test_errors_and_clear() {
    let services = Services::from_config(&test_config());
    let (addr, shutdown) = start_admin_server(&services).await;
    services
        .errors
        .handle_error("Notifications", "send", "rate limit exceeded", None);

    let (status, body) = get_json(api_url(addr, "/errors")).await;
    assert_eq!(status, 200);
    assert_eq!(body["Notifications:send"]["occurrenceCount"], 1);
    assert_eq!(body["Notifications:send"]["lastCategory"], "RATE_LIMIT");

    let (status, body) = post_json(api_url(addr, "/errors/clear")).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Error statistics cleared successfully");

    let (_, body) = get_json(api_url(addr, "/errors")).await;
    assert_eq!(body, serde_json::json!({}));

    shutdown.trigger();
}

#[tokio::test]
async fn test_config_view() {
    let services = Services::from_config(&test_config());
    let (addr, shutdown) = start_admin_server(&services).await;

    let (status, body) = get_json(api_url(addr, "/config")).await;
    assert_eq!(status, 200);
    assert_eq!(body["circuitBreaker"]["defaultFailureThreshold"], 3);
    assert_eq!(body["circuitBreaker"]["defaultOpenTimeoutMs"], 5000);
    assert_eq!(body["retry"]["defaultMaxAttempts"], 2);
    assert_eq!(body["retry"]["defaultInitialDelayMs"], 100);
    assert_eq!(body["retry"]["defaultBackoffMultiplier"], 2.0);
    assert_eq!(body["retry"]["defaultMaxDelayMs"], 30000);

    shutdown.trigger();
}

#[tokio::test]
async fn test_self_test_endpoints() {
    let services = Services::from_config(&test_config());
    let (addr, shutdown) = start_admin_server(&services).await;

    let (status, body) = post_json(api_url(addr, "/test/circuit-breaker?shouldFail=true")).await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], false);
    assert_eq!(body["result"], "Fallback");
    assert_eq!(body["failureCount"], 1);

    let (status, body) = post_json(api_url(addr, "/test/retry")).await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["attempts"], 1);

    let (status, body) = post_json(api_url(addr, "/test/error-handling?shouldFail=true")).await;
    assert_eq!(status, 200);
    assert_eq!(body["errorGenerated"], true);

    let (status, body) = post_json(api_url(addr, "/test/teleport")).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Unknown test feature: teleport");

    shutdown.trigger();
}
