//! Health check handler

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::application::services::{FacilityFeed, SharedSensorFeed};
use crate::domain::RepositoryProvider;

/// Health check state
#[derive(Clone)]
pub struct HealthState {
    pub repos: Arc<dyn RepositoryProvider>,
    pub feed: Arc<FacilityFeed>,
    pub sensors: SharedSensorFeed,
    pub started_at: Arc<Instant>,
}

/// Service health response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub store: ComponentHealth,
    pub facilities: usize,
    pub live_subscriptions: usize,
    pub sensor_readings: usize,
}

/// Component health status
#[derive(Debug, Serialize, ToSchema)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Store unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let uptime = state.started_at.elapsed().as_secs();

    let store_start = Instant::now();
    let (store, facilities) = match state.repos.occupancy().list_facilities().await {
        Ok(list) => (
            ComponentHealth {
                status: "ok".to_string(),
                latency_ms: Some(store_start.elapsed().as_millis() as u64),
            },
            list.len(),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                ComponentHealth {
                    status: "error".to_string(),
                    latency_ms: None,
                },
                0,
            )
        }
    };

    let healthy = store.status == "ok";
    let http_status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        http_status,
        Json(HealthResponse {
            status: if healthy { "ok" } else { "degraded" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            store,
            facilities,
            live_subscriptions: state.feed.subscriber_count(),
            sensor_readings: state.sensors.all().len(),
        }),
    )
}
