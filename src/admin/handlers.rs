use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::admin::facade::{
    ClearAck, ConfigView, HealthReport, MonitoringFacade, ResetAck, SelfTestReport,
};
use crate::resilience::{epoch_millis, CircuitBreakerStatus, ErrorRecord};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SelfTestParams {
    pub should_fail: bool,
}

pub async fn get_health(State(facade): State<MonitoringFacade>) -> Json<HealthReport> {
    Json(facade.health())
}

pub async fn get_circuit_breakers(
    State(facade): State<MonitoringFacade>,
) -> Json<BTreeMap<String, CircuitBreakerStatus>> {
    Json(facade.circuit_breakers())
}

pub async fn get_circuit_breaker(
    State(facade): State<MonitoringFacade>,
    Path(key): Path<String>,
) -> Json<CircuitBreakerStatus> {
    Json(facade.circuit_breaker(&key))
}

pub async fn reset_circuit_breaker(
    State(facade): State<MonitoringFacade>,
    Path(key): Path<String>,
) -> Json<ResetAck> {
    Json(facade.reset_circuit_breaker(&key))
}

pub async fn get_errors(
    State(facade): State<MonitoringFacade>,
) -> Json<BTreeMap<String, ErrorRecord>> {
    Json(facade.errors())
}

pub async fn clear_errors(State(facade): State<MonitoringFacade>) -> Json<ClearAck> {
    Json(facade.clear_errors())
}

pub async fn get_config(State(facade): State<MonitoringFacade>) -> Json<ConfigView> {
    Json(facade.config())
}

pub async fn run_self_test(
    State(facade): State<MonitoringFacade>,
    Path(feature): Path<String>,
    Query(params): Query<SelfTestParams>,
) -> Result<Json<SelfTestReport>, (StatusCode, Json<Value>)> {
    facade
        .run_self_test(&feature, params.should_fail)
        .await
        .map(Json)
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string(), "timestamp": epoch_millis() })),
            )
        })
}
