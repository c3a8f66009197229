//! Admin HTTP surface.
//!
//! # Routes (under `/api/resilience`)
//! ```text
//! GET  /health                        overall status + breaker and error snapshots
//! GET  /circuit-breakers              every breaker status
//! GET  /circuit-breakers/{key}        one breaker (unknown keys report CLOSED)
//! POST /circuit-breakers/{key}/reset  force CLOSED
//! GET  /errors                        error statistics
//! POST /errors/clear                  drop all error statistics
//! GET  /config                        defaults for new breakers and retries
//! POST /test/{feature}?shouldFail=    self-test: circuit-breaker | retry | error-handling
//! ```

pub mod facade;
pub mod handlers;

pub use facade::MonitoringFacade;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use self::handlers::*;
use crate::lifecycle::Shutdown;

/// Path prefix all admin routes are mounted under.
pub const API_PREFIX: &str = "/api/resilience";

pub fn setup_admin_router(facade: MonitoringFacade) -> Router {
    let api = Router::new()
        .route("/health", get(get_health))
        .route("/circuit-breakers", get(get_circuit_breakers))
        .route("/circuit-breakers/{key}", get(get_circuit_breaker))
        .route("/circuit-breakers/{key}/reset", post(reset_circuit_breaker))
        .route("/errors", get(get_errors))
        .route("/errors/clear", post(clear_errors))
        .route("/config", get(get_config))
        .route("/test/{feature}", post(run_self_test));

    Router::new()
        .nest(API_PREFIX, api)
        .layer(TraceLayer::new_for_http())
        .with_state(facade)
}

/// Serve the admin router on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    facade: MonitoringFacade,
    shutdown: &Shutdown,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, prefix = API_PREFIX, "Admin API listening");

    axum::serve(listener, setup_admin_router(facade))
        .with_graceful_shutdown(shutdown.signalled())
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
