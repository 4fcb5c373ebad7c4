//! JSON body extractor with field validation
//!
//! Request DTOs derive `validator::Validate`; handlers take
//! `ValidatedJson<EntryRequest>` instead of `Json<EntryRequest>` and never
//! see a body that broke its field rules. Rejections use the same
//! envelope as every other error, with code `validation`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use super::ApiResponse;

pub struct ValidatedJson<T>(pub T);

pub enum ValidatedJsonRejection {
    /// Body missing, wrong content type, or not decodable into `T` (400)
    Malformed(JsonRejection),
    /// Decoded but failed a field rule (422)
    Invalid(ValidationErrors),
}

impl ValidatedJsonRejection {
    fn status(&self) -> StatusCode {
        match self {
            Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Malformed(rejection) => format!("Invalid JSON: {}", rejection.body_text()),
            Self::Invalid(errors) => describe(errors),
        }
    }
}

/// `field: message` pairs, sorted by field so the text is stable.
fn describe(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    let parts: Vec<String> = fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(m) => format!("{}: {}", field, m),
                None => format!("{}: {}", field, e.code),
            })
        })
        .collect();

    if parts.is_empty() {
        "Validation failed".to_string()
    } else {
        parts.join("; ")
    }
}

impl IntoResponse for ValidatedJsonRejection {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::error(self.message()).with_code("validation");
        (self.status(), Json(body)).into_response()
    }
}

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ValidatedJsonRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(ValidatedJsonRejection::Malformed)?;
        value.validate().map_err(ValidatedJsonRejection::Invalid)?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::post;
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::domain::token::MAX_TOKEN_LEN;
    use crate::interfaces::http::modules::accounts::{TopUpRequest, UpdateProfileRequest};
    use crate::interfaces::http::modules::entries::EntryRequest;

    fn app() -> Router {
        Router::new()
            .route(
                "/entries",
                post(|ValidatedJson(r): ValidatedJson<EntryRequest>| async move { r.token }),
            )
            .route(
                "/topup",
                post(|ValidatedJson(r): ValidatedJson<TopUpRequest>| async move { r.amount.to_string() }),
            )
            .route(
                "/profile",
                post(|ValidatedJson(_): ValidatedJson<UpdateProfileRequest>| async { "ok" }),
            )
    }

    async fn post_json(uri: &str, body: String) -> (StatusCode, Vec<u8>) {
        let req = axum::http::Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn envelope(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn scanned_token_reaches_handler() {
        let (status, body) = post_json("/entries", json!({"token": "lotId=1"}).to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"lotId=1");
    }

    #[tokio::test]
    async fn empty_and_oversized_tokens_are_422() {
        for token in [String::new(), "x".repeat(MAX_TOKEN_LEN + 1)] {
            let (status, body) = post_json("/entries", json!({ "token": token }).to_string()).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            let env = envelope(&body);
            assert_eq!(env["success"], false);
            assert_eq!(env["code"], "validation");
            assert!(env["error"].as_str().unwrap().starts_with("token: "));
        }
    }

    #[tokio::test]
    async fn non_positive_top_up_is_422() {
        let (status, body) = post_json("/topup", json!({"amount": 0}).to_string()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(envelope(&body)["error"].as_str().unwrap().contains("amount"));

        let (status, body) = post_json("/topup", json!({"amount": 2500}).to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"2500");
    }

    #[tokio::test]
    async fn too_many_vehicles_is_422() {
        let plates: Vec<String> = (0..11).map(|i| format!("PL-{i}")).collect();
        let (status, _) = post_json("/profile", json!({ "vehicles": plates }).to_string()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn undecodable_body_is_400_with_validation_code() {
        let (status, body) = post_json("/topup", "{\"amount\": \"lots\"}".into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let env = envelope(&body);
        assert_eq!(env["code"], "validation");
        assert!(env["error"].as_str().unwrap().starts_with("Invalid JSON"));
    }
}
