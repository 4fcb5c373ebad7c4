//! Sensor HTTP handlers

use axum::extract::State;
use axum::Json;

use crate::application::services::SharedSensorFeed;
use crate::interfaces::http::common::ApiResponse;
use crate::interfaces::http::modules::facilities::SensorReadingDto;

#[derive(Clone)]
pub struct SensorAppState {
    pub sensors: SharedSensorFeed,
}

#[utoipa::path(
    get,
    path = "/api/v1/sensors",
    tag = "Sensors",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Latest reading per sensor key", body = ApiResponse<Vec<SensorReadingDto>>)
    )
)]
pub async fn list_sensors(State(state): State<SensorAppState>) -> Json<ApiResponse<Vec<SensorReadingDto>>> {
    Json(ApiResponse::success(
        state.sensors.all().into_iter().map(SensorReadingDto::from).collect(),
    ))
}
