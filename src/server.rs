//! Parking server runtime.
//!
//! [`ServerHandle`] owns the full lifecycle: database, migrations, demo
//! seed, metrics, sensor channel, REST API and graceful shutdown.

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::events::{create_event_bus, SharedEventBus};
use crate::application::services::SensorFeed;
use crate::config::{AppConfig, LoggingSettings};
use crate::domain::RepositoryProvider;
use crate::infrastructure::database::migrator::Migrator;
use crate::infrastructure::seed::seed_if_empty;
use crate::infrastructure::{init_database, DatabaseConfig, SeaOrmRepositoryProvider, SensorFeedClient};
use crate::interfaces::http::modules::metrics::install_recorder;
use crate::interfaces::http::{create_api_router, AppState};
use crate::support::shutdown::{ShutdownCoordinator, ShutdownSignal};

// ── Options ────────────────────────────────────────────────────────

pub struct ServerOptions {
    pub config: AppConfig,
    /// Run database migrations on startup (default: true).
    pub auto_migrate: bool,
    /// Provision the demo facilities into an empty store (default: follows `seed.demo_facilities`).
    pub seed_demo: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        let config = AppConfig::default();
        let seed_demo = config.seed.demo_facilities;
        Self {
            config,
            auto_migrate: true,
            seed_demo,
        }
    }
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running parking server.
///
/// # Examples
///
/// ```rust,no_run
/// use smart_parking::server::{ServerHandle, ServerOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServerHandle::start(ServerOptions::default()).await?;
///     handle.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    pub event_bus: SharedEventBus,
    pub repos: Arc<dyn RepositoryProvider>,
    pub config: AppConfig,
    /// Address the REST API is bound to.
    pub local_addr: std::net::SocketAddr,

    db: DatabaseConnection,
    shutdown: ShutdownCoordinator,
    api_task: JoinHandle<()>,
    sensor_task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub async fn start(opts: ServerOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let app_cfg = opts.config;
        app_cfg.validate()?;

        info!("Starting Smart Parking server...");
        if app_cfg.security.uses_default_secret() {
            warn!("security.jwt_secret is the built-in placeholder; set JWT_SECRET before exposing this server");
        }

        // ── Database ───────────────────────────────────────────
        let db_config = DatabaseConfig::from(&app_cfg.database);
        info!(url = %db_config.url, "Connecting to database");
        let db = init_database(&db_config).await?;

        if opts.auto_migrate {
            info!("Running database migrations...");
            Migrator::up(&db, None).await?;
            info!("Migrations completed");
        }

        let repos: Arc<dyn RepositoryProvider> = Arc::new(SeaOrmRepositoryProvider::new(
            db.clone(),
            app_cfg.billing.ledger_floor,
        ));

        if opts.seed_demo {
            let created = seed_if_empty(repos.occupancy(), app_cfg.seed.slots_per_facility).await?;
            if created > 0 {
                info!(created, "Demo facilities provisioned");
            }
        }

        // ── Metrics ────────────────────────────────────────────
        let prometheus_handle = install_recorder();
        if prometheus_handle.is_some() {
            info!("Prometheus metrics recorder installed");
        }

        // ── Shared state ───────────────────────────────────────
        let event_bus = create_event_bus();
        let sensors = Arc::new(SensorFeed::with_capacity(app_cfg.sensor_feed.channel_capacity));
        let state = AppState::new(repos.clone(), sensors.clone(), event_bus.clone(), &app_cfg);

        let shutdown = ShutdownCoordinator::new(app_cfg.server.shutdown_timeout);
        let shutdown_signal = shutdown.signal();

        // ── Sensor channel ─────────────────────────────────────
        let sensor_task = match app_cfg.sensor_feed.url.as_deref() {
            Some(url) if !url.trim().is_empty() => {
                info!(url, "Subscribing to bay sensor channel");
                Some(SensorFeedClient::new(url, sensors, &app_cfg.sensor_feed).spawn(shutdown_signal.clone()))
            }
            _ => {
                info!("No sensor channel configured; sensor overlay disabled");
                None
            }
        };

        // ── REST API server ────────────────────────────────────
        let router = create_api_router(state, prometheus_handle);
        let api_addr = app_cfg.server.address();
        let listener = tokio::net::TcpListener::bind(&api_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("REST API server listening on http://{}", local_addr);
        info!("Swagger UI available at http://{}/docs/", local_addr);

        let api_shutdown = shutdown_signal.clone();
        let api_server = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            api_shutdown.wait().await;
            info!("REST API server received shutdown signal");
        });

        let api_task = tokio::spawn(async move {
            if let Err(e) = api_server.await {
                error!("REST API server error: {}", e);
            }
        });

        Ok(Self {
            event_bus,
            repos,
            config: app_cfg,
            local_addr,
            db,
            shutdown,
            api_task,
            sensor_task,
        })
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Wait for the server to stop after shutdown has been triggered.
    /// Tasks still running after the configured timeout are abandoned.
    pub async fn wait(self) {
        info!("Waiting for server tasks to complete...");
        let Self {
            db,
            shutdown,
            api_task,
            sensor_task,
            ..
        } = self;

        shutdown
            .shutdown_with_cleanup(|| async move {
                match api_task.await {
                    Ok(()) => info!("REST API server stopped"),
                    Err(e) => error!("REST API server task panicked: {}", e),
                }
                if let Some(task) = sensor_task {
                    if let Err(e) = task.await {
                        error!("Sensor client task panicked: {}", e);
                    }
                }
            })
            .await;

        if let Err(e) = db.close().await {
            warn!("Error closing database connection: {}", e);
        } else {
            info!("Database connection closed");
        }

        info!("Smart Parking server shutdown complete");
    }

    pub async fn shutdown(self) {
        info!("Shutting down Smart Parking server...");
        self.trigger_shutdown();
        self.wait().await;
    }

    pub fn is_running(&self) -> bool {
        !self.api_task.is_finished()
    }
}

/// Initialize tracing from the logging settings. `RUST_LOG` wins over the
/// configured level.
///
/// Call once at process startup, before [`ServerHandle::start`].
pub fn init_tracing(logging: &LoggingSettings) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    match logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}
