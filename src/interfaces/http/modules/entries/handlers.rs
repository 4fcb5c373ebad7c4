//! Entry HTTP handlers

use std::sync::Arc;

use axum::extract::State;
use axum::{Extension, Json};

use crate::application::services::EntryBillingService;
use crate::interfaces::http::common::{ApiResponse, ValidatedJson};
use crate::interfaces::http::error::ApiResult;
use crate::interfaces::http::middleware::AuthenticatedUser;

use super::dto::*;

#[derive(Clone)]
pub struct EntryAppState {
    pub billing: Arc<EntryBillingService>,
}

#[utoipa::path(
    post,
    path = "/api/v1/entries",
    tag = "Entries",
    security(("bearer_auth" = [])),
    request_body = EntryRequest,
    responses(
        (status = 200, description = "Entry approved and fee charged", body = ApiResponse<EntryDto>),
        (status = 400, description = "Invalid token"),
        (status = 402, description = "Balance below the entry minimum"),
        (status = 409, description = "Same token still being processed")
    )
)]
pub async fn process_entry(
    State(state): State<EntryAppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ValidatedJson(request): ValidatedJson<EntryRequest>,
) -> ApiResult<EntryDto> {
    let receipt = state.billing.process_entry(&user.caller(), &request.token).await?;
    Ok(Json(ApiResponse::success(receipt.into())))
}
