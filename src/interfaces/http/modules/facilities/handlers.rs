//! Facility HTTP handlers

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};

use crate::application::services::{EntryBillingService, GeoLocator, RequestLocation, SharedSensorFeed};
use crate::domain::RepositoryProvider;
use crate::interfaces::http::common::ApiResponse;
use crate::interfaces::http::error::ApiResult;
use crate::interfaces::http::middleware::AuthenticatedUser;

use super::dto::*;

/// Application state for facility handlers.
#[derive(Clone)]
pub struct FacilityAppState {
    pub repos: Arc<dyn RepositoryProvider>,
    pub geo: Arc<GeoLocator>,
    pub sensors: SharedSensorFeed,
    pub billing: Arc<EntryBillingService>,
}

#[utoipa::path(
    get,
    path = "/api/v1/facilities",
    tag = "Facilities",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All facilities", body = ApiResponse<Vec<FacilityDto>>)
    )
)]
pub async fn list_facilities(State(state): State<FacilityAppState>) -> ApiResult<Vec<FacilityDto>> {
    let facilities = state.repos.occupancy().list_facilities().await?;
    Ok(Json(ApiResponse::success(
        facilities.into_iter().map(FacilityDto::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/facilities/nearest",
    tag = "Facilities",
    security(("bearer_auth" = [])),
    params(NearestQuery),
    responses(
        (status = 200, description = "Closest facility, or null when none has a location", body = ApiResponse<NearestFacilityDto>),
        (status = 422, description = "Location unavailable")
    )
)]
pub async fn nearest_facility(
    State(state): State<FacilityAppState>,
    Query(query): Query<NearestQuery>,
) -> ApiResult<Option<NearestFacilityDto>> {
    let location = RequestLocation {
        latitude: query.latitude,
        longitude: query.longitude,
    };
    let nearest = state.geo.nearest(&location).await?;
    Ok(Json(ApiResponse::success(nearest.map(NearestFacilityDto::from))))
}

#[utoipa::path(
    get,
    path = "/api/v1/facilities/{facility_id}/slots",
    tag = "Facilities",
    security(("bearer_auth" = [])),
    params(("facility_id" = String, Path, description = "Facility ID")),
    responses(
        (status = 200, description = "Slot set with sensor overlay", body = ApiResponse<FacilitySlotsDto>),
        (status = 404, description = "Facility not found")
    )
)]
pub async fn list_slots(
    State(state): State<FacilityAppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(facility_id): Path<String>,
) -> ApiResult<FacilitySlotsDto> {
    let snapshot = state.repos.occupancy().snapshot(&facility_id).await?;
    Ok(Json(ApiResponse::success(FacilitySlotsDto::with_sensors(
        &snapshot,
        &state.sensors,
        &user.user_id,
        user.is_admin,
    ))))
}

#[utoipa::path(
    post,
    path = "/api/v1/facilities/{facility_id}/token",
    tag = "Facilities",
    security(("bearer_auth" = [])),
    params(("facility_id" = String, Path, description = "Facility ID")),
    responses(
        (status = 200, description = "Fresh gate token", body = ApiResponse<FacilityTokenDto>),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "Facility not found")
    )
)]
pub async fn issue_token(
    State(state): State<FacilityAppState>,
    Path(facility_id): Path<String>,
) -> ApiResult<FacilityTokenDto> {
    let token = state.billing.issue_token(&facility_id).await?;
    Ok(Json(ApiResponse::success(token.into())))
}
