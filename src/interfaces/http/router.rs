//! API Router with Swagger UI

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::FromRef,
    middleware,
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::application::events::SharedEventBus;
use crate::application::services::{
    AccountService, EntryBillingService, EntryPolicy, FacilityFeed, GeoLocator, ReservationCoordinator,
    SharedSensorFeed,
};
use crate::config::AppConfig;
use crate::domain::RepositoryProvider;
use crate::infrastructure::crypto::jwt::JwtConfig;
use crate::interfaces::http::common::ApiResponse;
use crate::interfaces::http::middleware::{auth_middleware, require_admin, AuthState};
use crate::interfaces::http::modules::{
    accounts, bookings, entries, facilities, health, metrics as metrics_module, sensors,
};
use crate::interfaces::ws::{ws_notifications_handler, ws_slot_stream_handler, NotificationState, SlotStreamState};
use crate::support::retry::RetryConfig;

/// Everything the routes need. Axum extracts each handler's own state via
/// `FromRef`.
#[derive(Clone)]
pub struct AppState {
    pub repos: Arc<dyn RepositoryProvider>,
    pub coordinator: Arc<ReservationCoordinator>,
    pub billing: Arc<EntryBillingService>,
    pub accounts: Arc<AccountService>,
    pub geo: Arc<GeoLocator>,
    pub feed: Arc<FacilityFeed>,
    pub sensors: SharedSensorFeed,
    pub event_bus: SharedEventBus,
    pub jwt_config: JwtConfig,
    pub started_at: Arc<Instant>,
}

impl AppState {
    /// Wire the services over one repository provider.
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        sensors: SharedSensorFeed,
        event_bus: SharedEventBus,
        config: &AppConfig,
    ) -> Self {
        let retry = RetryConfig::from(&config.retry);
        let feed = Arc::new(FacilityFeed::new());

        Self {
            coordinator: Arc::new(ReservationCoordinator::new(
                repos.clone(),
                feed.clone(),
                event_bus.clone(),
                retry.clone(),
            )),
            billing: Arc::new(EntryBillingService::new(
                repos.clone(),
                event_bus.clone(),
                EntryPolicy::from(&config.billing),
                retry.clone(),
            )),
            accounts: Arc::new(AccountService::new(repos.clone(), event_bus.clone(), retry)),
            geo: Arc::new(GeoLocator::new(
                repos.clone(),
                Duration::from_millis(config.geo.location_timeout_ms),
            )),
            jwt_config: JwtConfig::from(&config.security),
            started_at: Arc::new(Instant::now()),
            repos,
            feed,
            sensors,
            event_bus,
        }
    }
}

// -- FromRef implementations so each handler keeps its own State<T> extractor --

impl FromRef<AppState> for AuthState {
    fn from_ref(s: &AppState) -> Self {
        AuthState {
            jwt_config: s.jwt_config.clone(),
            accounts: Arc::clone(&s.accounts),
        }
    }
}

impl FromRef<AppState> for facilities::FacilityAppState {
    fn from_ref(s: &AppState) -> Self {
        facilities::FacilityAppState {
            repos: Arc::clone(&s.repos),
            geo: Arc::clone(&s.geo),
            sensors: s.sensors.clone(),
            billing: Arc::clone(&s.billing),
        }
    }
}

impl FromRef<AppState> for bookings::BookingAppState {
    fn from_ref(s: &AppState) -> Self {
        bookings::BookingAppState {
            coordinator: Arc::clone(&s.coordinator),
        }
    }
}

impl FromRef<AppState> for entries::EntryAppState {
    fn from_ref(s: &AppState) -> Self {
        entries::EntryAppState {
            billing: Arc::clone(&s.billing),
        }
    }
}

impl FromRef<AppState> for accounts::AccountAppState {
    fn from_ref(s: &AppState) -> Self {
        accounts::AccountAppState {
            accounts: Arc::clone(&s.accounts),
        }
    }
}

impl FromRef<AppState> for sensors::SensorAppState {
    fn from_ref(s: &AppState) -> Self {
        sensors::SensorAppState {
            sensors: s.sensors.clone(),
        }
    }
}

impl FromRef<AppState> for health::HealthState {
    fn from_ref(s: &AppState) -> Self {
        health::HealthState {
            repos: Arc::clone(&s.repos),
            feed: Arc::clone(&s.feed),
            sensors: s.sensors.clone(),
            started_at: Arc::clone(&s.started_at),
        }
    }
}

impl FromRef<AppState> for NotificationState {
    fn from_ref(s: &AppState) -> Self {
        NotificationState {
            event_bus: s.event_bus.clone(),
        }
    }
}

impl FromRef<AppState> for SlotStreamState {
    fn from_ref(s: &AppState) -> Self {
        SlotStreamState {
            repos: Arc::clone(&s.repos),
            feed: Arc::clone(&s.feed),
            sensors: s.sensors.clone(),
        }
    }
}

/// Security scheme modifier for OpenAPI
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Identity provider token"))
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        facilities::list_facilities,
        facilities::nearest_facility,
        facilities::list_slots,
        facilities::issue_token,
        bookings::book_slot,
        bookings::release_slot,
        entries::process_entry,
        accounts::get_account,
        accounts::update_profile,
        accounts::top_up,
        accounts::list_transactions,
        sensors::list_sensors,
    ),
    components(
        schemas(
            ApiResponse<String>,
            health::HealthResponse,
            health::ComponentHealth,
            facilities::FacilityDto,
            facilities::SlotDto,
            facilities::SensorReadingDto,
            facilities::FacilitySlotsDto,
            facilities::NearestFacilityDto,
            facilities::FacilityTokenDto,
            bookings::BookingDto,
            bookings::ReleaseDto,
            entries::EntryRequest,
            entries::EntryDto,
            accounts::AccountDto,
            accounts::LedgerEntryDto,
            accounts::BalanceChangeDto,
            accounts::UpdateProfileRequest,
            accounts::TopUpRequest,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Facilities", description = "Facilities, nearest lookup, slot sets and gate tokens"),
        (name = "Bookings", description = "Slot booking and release"),
        (name = "Entries", description = "Gate-token entry billing"),
        (name = "Account", description = "Profile, wallet and transaction history"),
        (name = "Sensors", description = "Advisory bay sensor readings"),
    ),
    info(
        title = "Smart Parking API",
        version = "1.0.0",
        description = "Slot reservations, entry billing and prepaid wallets for parking facilities",
        license(name = "MIT")
    )
)]
pub struct ApiDoc;

/// Create the API router with all routes
pub fn create_api_router(state: AppState, metrics: Option<PrometheusHandle>) -> Router {
    let auth_state = AuthState::from_ref(&state);

    let facility_routes = Router::new()
        .route("/", get(facilities::list_facilities))
        .route("/nearest", get(facilities::nearest_facility))
        .route("/{facility_id}/slots", get(facilities::list_slots))
        .route("/{facility_id}/slots/{slot_id}/book", post(bookings::book_slot))
        .route("/{facility_id}/slots/{slot_id}/release", post(bookings::release_slot))
        .route("/{facility_id}/stream", get(ws_slot_stream_handler))
        .route(
            "/{facility_id}/token",
            post(facilities::issue_token).route_layer(middleware::from_fn(require_admin)),
        );

    let account_routes = Router::new()
        .route("/", get(accounts::get_account))
        .route("/profile", put(accounts::update_profile))
        .route("/top-up", post(accounts::top_up))
        .route("/transactions", get(accounts::list_transactions));

    // Everything under /api/v1 requires a bearer token.
    let api_routes = Router::new()
        .nest("/facilities", facility_routes)
        .nest("/account", account_routes)
        .route("/entries", post(entries::process_entry))
        .route("/sensors", get(sensors::list_sensors))
        .route("/notifications", get(ws_notifications_handler))
        .layer(middleware::from_fn_with_state(auth_state, auth_middleware));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let swagger_routes = SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi());

    let mut router = Router::new()
        .merge(swagger_routes)
        .route("/health", get(health::health_check))
        .nest("/api/v1", api_routes)
        .with_state(state);

    if let Some(handle) = metrics {
        router = router.merge(
            Router::new()
                .route("/metrics", get(metrics_module::prometheus_metrics))
                .with_state(metrics_module::MetricsState { handle }),
        );
    }

    router
        .layer(middleware::from_fn(metrics_module::http_metrics_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::application::events::create_event_bus;
    use crate::infrastructure::crypto::jwt::create_token;
    use crate::infrastructure::seed::seed_if_empty;
    use crate::infrastructure::storage::InMemoryRepositoryProvider;

    async fn app() -> (Router, JwtConfig) {
        let config = AppConfig::default();
        let repos = Arc::new(InMemoryRepositoryProvider::new(config.billing.ledger_floor));
        seed_if_empty(repos.occupancy(), 2).await.unwrap();
        let state = AppState::new(repos, SharedSensorFeed::default(), create_event_bus(), &config);
        let jwt = state.jwt_config.clone();
        (create_api_router(state, None), jwt)
    }

    fn bearer(jwt: &JwtConfig, user: &str, role: Option<&str>) -> String {
        format!("Bearer {}", create_token(user, Some(user), role, jwt).unwrap())
    }

    async fn call(router: &Router, method: &str, uri: &str, auth: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_is_public_and_api_is_not() {
        let (router, _) = app().await;
        let (status, body) = call(&router, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["facilities"], 5);

        let (status, body) = call(&router, "GET", "/api/v1/facilities", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "unauthenticated");
    }

    #[tokio::test]
    async fn top_up_book_and_release_flow() {
        let (router, jwt) = app().await;
        let alice = bearer(&jwt, "alice", None);

        let (status, body) = call(&router, "POST", "/api/v1/account/top-up", Some(&alice), Some(json!({"amount": 5000}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["new_balance"], 5000);

        let (status, body) = call(&router, "POST", "/api/v1/facilities/1/slots/S1/book?expected_rate=3000", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["new_balance"], 2000);
        assert_eq!(body["data"]["slot"]["booked_by_me"], true);
        assert_eq!(body["data"]["facility"]["available_slots"], 1);

        let (status, body) = call(&router, "POST", "/api/v1/facilities/1/slots/S1/book", Some(&alice), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "already_booked");

        let bob = bearer(&jwt, "bob", None);
        let (status, _) = call(&router, "POST", "/api/v1/facilities/1/slots/S1/release", Some(&bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&router, "POST", "/api/v1/facilities/1/slots/S1/release", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["refunded"], 0);

        let (_, body) = call(&router, "GET", "/api/v1/account/transactions", Some(&alice), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn entry_below_minimum_is_payment_required() {
        let (router, jwt) = app().await;
        let alice = bearer(&jwt, "alice", None);
        call(&router, "POST", "/api/v1/account/top-up", Some(&alice), Some(json!({"amount": 1500}))).await;

        let (status, body) = call(&router, "POST", "/api/v1/entries", Some(&alice), Some(json!({"token": "{\"lotId\":1}"}))).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["code"], "insufficient_balance");

        let (_, body) = call(&router, "GET", "/api/v1/account", Some(&alice), None).await;
        assert_eq!(body["data"]["balance"], 1500);
    }

    #[tokio::test]
    async fn gate_tokens_are_admin_only() {
        let (router, jwt) = app().await;
        let user = bearer(&jwt, "alice", None);
        let admin = bearer(&jwt, "ops", Some("admin"));

        let (status, _) = call(&router, "POST", "/api/v1/facilities/1/token", Some(&user), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&router, "POST", "/api/v1/facilities/1/token", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["payload"].as_str().unwrap().contains("\"lotId\":\"1\""));
    }

    #[tokio::test]
    async fn nearest_requires_coordinates() {
        let (router, jwt) = app().await;
        let alice = bearer(&jwt, "alice", None);

        let (status, body) = call(&router, "GET", "/api/v1/facilities/nearest?latitude=28.60&longitude=77.20", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["facility"]["name"], "City Center Lot");

        let (status, body) = call(&router, "GET", "/api/v1/facilities/nearest?latitude=28.60", Some(&alice), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "location_unavailable");
    }
}
