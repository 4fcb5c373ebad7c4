//! # Smart Parking
//!
//! Slot reservations, gate-token entry billing and prepaid wallets for
//! parking facilities.
//!
//! ## Architecture
//!
//! - **domain**: facilities, slots, accounts, ledger, gate tokens and the store traits
//! - **application**: reservation coordinator, entry billing, accounts, live feeds and the event bus
//! - **infrastructure**: SeaORM and in-memory stores, JWT verification, sensor channel client
//! - **interfaces**: REST API with Swagger documentation and WebSocket streams
//! - **server**: runtime lifecycle shared by the CLI

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod support;

pub use config::{default_config_path, AppConfig};

pub use infrastructure::{init_database, DatabaseConfig, InMemoryRepositoryProvider, SeaOrmRepositoryProvider};

pub use interfaces::http::{create_api_router, AppState};

pub use application::events::{create_event_bus, Event, EventBus, SharedEventBus};
