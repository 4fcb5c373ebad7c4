//! Booking HTTP handlers

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};

use crate::application::services::ReservationCoordinator;
use crate::interfaces::http::common::ApiResponse;
use crate::interfaces::http::error::ApiResult;
use crate::interfaces::http::middleware::AuthenticatedUser;

use super::dto::*;

#[derive(Clone)]
pub struct BookingAppState {
    pub coordinator: Arc<ReservationCoordinator>,
}

#[utoipa::path(
    post,
    path = "/api/v1/facilities/{facility_id}/slots/{slot_id}/book",
    tag = "Bookings",
    security(("bearer_auth" = [])),
    params(
        ("facility_id" = String, Path, description = "Facility ID"),
        ("slot_id" = String, Path, description = "Slot ID"),
        BookQuery
    ),
    responses(
        (status = 200, description = "Slot booked and charged", body = ApiResponse<BookingDto>),
        (status = 402, description = "Insufficient funds"),
        (status = 404, description = "Facility or slot not found"),
        (status = 409, description = "Slot already booked")
    )
)]
pub async fn book_slot(
    State(state): State<BookingAppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((facility_id, slot_id)): Path<(String, String)>,
    Query(query): Query<BookQuery>,
) -> ApiResult<BookingDto> {
    let receipt = state
        .coordinator
        .book(&user.caller(), &facility_id, &slot_id, query.expected_rate)
        .await?;
    Ok(Json(ApiResponse::success(BookingDto::new(
        receipt,
        &user.user_id,
        user.is_admin,
    ))))
}

#[utoipa::path(
    post,
    path = "/api/v1/facilities/{facility_id}/slots/{slot_id}/release",
    tag = "Bookings",
    security(("bearer_auth" = [])),
    params(
        ("facility_id" = String, Path, description = "Facility ID"),
        ("slot_id" = String, Path, description = "Slot ID")
    ),
    responses(
        (status = 200, description = "Slot released, nothing refunded", body = ApiResponse<ReleaseDto>),
        (status = 403, description = "Held by another user"),
        (status = 409, description = "Slot not booked")
    )
)]
pub async fn release_slot(
    State(state): State<BookingAppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((facility_id, slot_id)): Path<(String, String)>,
) -> ApiResult<ReleaseDto> {
    let receipt = state
        .coordinator
        .release(&user.caller(), &facility_id, &slot_id)
        .await?;
    Ok(Json(ApiResponse::success(ReleaseDto::new(
        receipt,
        &user.user_id,
        user.is_admin,
    ))))
}
