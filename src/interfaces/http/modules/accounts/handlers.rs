//! Account HTTP handlers

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::{Extension, Json};

use crate::application::services::AccountService;
use crate::domain::account::ProfileUpdate;
use crate::interfaces::http::common::{ApiResponse, ValidatedJson};
use crate::interfaces::http::error::ApiResult;
use crate::interfaces::http::middleware::AuthenticatedUser;

use super::dto::*;

#[derive(Clone)]
pub struct AccountAppState {
    pub accounts: Arc<AccountService>,
}

#[utoipa::path(
    get,
    path = "/api/v1/account",
    tag = "Account",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's account", body = ApiResponse<AccountDto>),
        (status = 401, description = "Unauthenticated")
    )
)]
pub async fn get_account(
    State(state): State<AccountAppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<AccountDto> {
    let account = state.accounts.get(&user.user_id).await?;
    Ok(Json(ApiResponse::success(account.into())))
}

#[utoipa::path(
    put,
    path = "/api/v1/account/profile",
    tag = "Account",
    security(("bearer_auth" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated account", body = ApiResponse<AccountDto>),
        (status = 422, description = "Invalid profile")
    )
)]
pub async fn update_profile(
    State(state): State<AccountAppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ValidatedJson(request): ValidatedJson<UpdateProfileRequest>,
) -> ApiResult<AccountDto> {
    let update = ProfileUpdate::from(request);
    let account = state.accounts.update_profile(&user.user_id, &update).await?;
    Ok(Json(ApiResponse::success(account.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/account/top-up",
    tag = "Account",
    security(("bearer_auth" = [])),
    request_body = TopUpRequest,
    responses(
        (status = 200, description = "Wallet credited", body = ApiResponse<BalanceChangeDto>),
        (status = 422, description = "Amount out of range")
    )
)]
pub async fn top_up(
    State(state): State<AccountAppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ValidatedJson(request): ValidatedJson<TopUpRequest>,
) -> ApiResult<BalanceChangeDto> {
    let receipt = state.accounts.top_up(&user.user_id, request.amount).await?;
    Ok(Json(ApiResponse::success(receipt.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/account/transactions",
    tag = "Account",
    security(("bearer_auth" = [])),
    params(TransactionsQuery),
    responses(
        (status = 200, description = "Ledger entries, newest first", body = ApiResponse<Vec<LedgerEntryDto>>)
    )
)]
pub async fn list_transactions(
    State(state): State<AccountAppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<TransactionsQuery>,
) -> ApiResult<Vec<LedgerEntryDto>> {
    let entries = state.accounts.transactions(&user.user_id, query.limit).await?;
    Ok(Json(ApiResponse::success(
        entries.into_iter().map(LedgerEntryDto::from).collect(),
    )))
}
