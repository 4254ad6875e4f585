use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::health::HealthChecker;
use crate::metrics::ThrottleMetrics;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<AdmissionController>,
    pub health: HealthChecker,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub enabled: bool,
    pub algorithm: String,
    pub global: ThrottleMetrics,
}

#[derive(Debug, Serialize)]
pub struct WeatherForecast {
    pub date: String,
    pub temperature_c: i32,
    pub temperature_f: i32,
    pub summary: &'static str,
}

const SUMMARIES: [&str; 10] = [
    "Freezing", "Bracing", "Chilly", "Cool", "Mild", "Warm", "Balmy", "Hot", "Sweltering", "Scorching",
];

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.health.check_health().await;
    let code = if status.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.health.is_ready().await {
        (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ready", "rate_limiting": state.controller.is_enabled() })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "not_ready", "counter_store": "unreachable" })),
        )
    }
}

/// Decision counts of this instance
pub async fn metrics_report(State(state): State<AppState>) -> impl IntoResponse {
    Json(MetricsResponse {
        enabled: state.controller.is_enabled(),
        algorithm: state.controller.algorithm().to_string(),
        global: state.controller.metrics().snapshot(),
    })
}

/// Sample resource behind the admission layer
pub async fn weather_forecast() -> impl IntoResponse {
    let today = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        / 86_400;

    let forecast: Vec<WeatherForecast> = (1..=5u64)
        .map(|offset| {
            let day = today + offset;
            let temperature_c = ((day * 37) % 75) as i32 - 20;
            WeatherForecast {
                date: format!("day-{}", day),
                temperature_c,
                temperature_f: 32 + (temperature_c as f64 / 0.5556) as i32,
                summary: SUMMARIES[(day % SUMMARIES.len() as u64) as usize],
            }
        })
        .collect();

    Json(forecast)
}
