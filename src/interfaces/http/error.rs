//! Domain outcome → HTTP response mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::domain::DomainError;

use super::common::ApiResponse;

/// Handler result: the success envelope or a typed failure.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }
}

pub fn status_for(error: &DomainError) -> StatusCode {
    match error {
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::Validation(_) | DomainError::InvalidToken(_) => StatusCode::BAD_REQUEST,
        DomainError::AlreadyBooked { .. } | DomainError::NotBooked { .. } | DomainError::DuplicateScan(_) => {
            StatusCode::CONFLICT
        }
        DomainError::NotHolder { .. } => StatusCode::FORBIDDEN,
        DomainError::InsufficientFunds { .. } | DomainError::InsufficientBalance { .. } => {
            StatusCode::PAYMENT_REQUIRED
        }
        DomainError::LocationUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::Unauthenticated => StatusCode::UNAUTHORIZED,
        DomainError::Conflict(_) => StatusCode::SERVICE_UNAVAILABLE,
        DomainError::CompensationFailed { .. } | DomainError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        let status = status_for(&error);
        if status.is_server_error() {
            tracing::error!(code = error.code(), error = %error, "Request failed");
        }
        Self::new(status, error.code(), error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::error(self.message).with_code(self.code);
        (self.status, Json(body)).into_response()
    }
}
