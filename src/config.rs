//! Configuration module
//!
//! `AppConfig` is read from a TOML file (default
//! `~/.config/smart-parking/config.toml`). Every section has defaults, so a
//! partial file, or no file at all, is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::support::errors::InfraError;

/// Default config location: `~/.config/smart-parking/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smart-parking")
        .join("config.toml")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
    pub security: SecuritySettings,
    pub billing: BillingSettings,
    pub retry: RetrySettings,
    pub geo: GeoSettings,
    pub sensor_feed: SensorFeedSettings,
    pub seed: SeedSettings,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, InfraError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, InfraError> {
        let cfg: AppConfig =
            toml::from_str(raw).map_err(|e| InfraError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject combinations that would break billing invariants.
    pub fn validate(&self) -> Result<(), InfraError> {
        if self.billing.entry_fee <= 0 {
            return Err(InfraError::Config("billing.entry_fee must be positive".into()));
        }
        if self.billing.minimum_entry_balance < 0 || self.billing.ledger_floor < 0 {
            return Err(InfraError::Config(
                "billing.minimum_entry_balance and billing.ledger_floor must not be negative".into(),
            ));
        }
        if self.security.jwt_secret.is_empty() {
            return Err(InfraError::Config("security.jwt_secret must be set".into()));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(InfraError::Config(format!(
                "retry.backoff_multiplier must be a finite number >= 1.0, got {}",
                multiplier
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Seconds to wait for in-flight work on shutdown
    pub shutdown_timeout: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout: 30,
        }
    }
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// e.g. "sqlite://./parking.db?mode=rwc"
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://./parking.db?mode=rwc".to_string(),
            max_connections: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// tracing EnvFilter directive; `RUST_LOG` wins when set
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Placeholder secret used when neither the config nor `JWT_SECRET` sets one
pub const DEFAULT_JWT_SECRET: &str = "change-me-in-production";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Shared HS256 secret of the identity provider
    pub jwt_secret: String,
    pub jwt_issuer: String,
    /// Role claim value that may release other users' slots
    pub admin_role: String,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            jwt_secret: std::env::var("JWT_SECRET")
                .unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string()),
            jwt_issuer: "smart-parking".to_string(),
            admin_role: "admin".to_string(),
        }
    }
}

impl SecuritySettings {
    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

/// Amounts are in minor currency units (paise).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingSettings {
    pub entry_fee: i64,
    /// Balance required before an entry fee is charged
    pub minimum_entry_balance: i64,
    /// No debit may take a balance below this value
    pub ledger_floor: i64,
    /// How long a scanned nonce is remembered
    pub entry_dedupe_window_secs: u64,
    pub currency: String,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            entry_fee: 2000,
            minimum_entry_balance: 2000,
            ledger_floor: 0,
            entry_dedupe_window_secs: 300,
            currency: "INR".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 20,
            backoff_multiplier: 2.0,
            max_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoSettings {
    pub location_timeout_ms: u64,
}

impl Default for GeoSettings {
    fn default() -> Self {
        Self {
            location_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorFeedSettings {
    /// WebSocket URL of the live sensor channel; disabled when unset
    pub url: Option<String>,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    /// Capacity of the change stream before slow consumers start skipping
    pub channel_capacity: usize,
}

impl Default for SensorFeedSettings {
    fn default() -> Self {
        Self {
            url: None,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 30_000,
            channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedSettings {
    /// Provision the demo facilities when the store has none
    pub demo_facilities: bool,
    pub slots_per_facility: u32,
}

impl Default for SeedSettings {
    fn default() -> Self {
        Self {
            demo_facilities: true,
            slots_per_facility: 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = AppConfig::from_toml("").unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.billing.entry_fee, 2000);
        assert_eq!(cfg.billing.minimum_entry_balance, 2000);
        assert!(cfg.sensor_feed.url.is_none());
    }

    #[test]
    fn partial_sections_are_merged_with_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            [server]
            port = 9999

            [billing]
            entry_fee = 1500

            [sensor_feed]
            url = "ws://localhost:9001/slots"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.port, 9999);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.billing.entry_fee, 1500);
        assert_eq!(cfg.billing.minimum_entry_balance, 2000);
        assert_eq!(cfg.sensor_feed.url.as_deref(), Some("ws://localhost:9001/slots"));
    }

    #[test]
    fn non_positive_entry_fee_is_rejected() {
        let err = AppConfig::from_toml("[billing]\nentry_fee = 0\n").unwrap_err();
        assert!(err.to_string().contains("entry_fee"));
    }

    #[test]
    fn unusable_backoff_multiplier_is_rejected() {
        for raw in ["0.5", "-2.0", "nan", "inf"] {
            let err = AppConfig::from_toml(&format!("[retry]\nbackoff_multiplier = {raw}\n")).unwrap_err();
            assert!(err.to_string().contains("backoff_multiplier"), "{raw}");
        }
        assert!(AppConfig::from_toml("[retry]\nbackoff_multiplier = 1.0\n").is_ok());
    }

    #[test]
    fn placeholder_jwt_secret_is_detected() {
        let cfg = AppConfig::from_toml(&format!("[security]\njwt_secret = \"{DEFAULT_JWT_SECRET}\"\n")).unwrap();
        assert!(cfg.security.uses_default_secret());

        let cfg = AppConfig::from_toml("[security]\njwt_secret = \"s3cr3t-from-vault\"\n").unwrap();
        assert!(!cfg.security.uses_default_secret());
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = AppConfig::from_toml("[server\nport = 1").unwrap_err();
        assert!(matches!(err, InfraError::Config(_)));
    }
}
