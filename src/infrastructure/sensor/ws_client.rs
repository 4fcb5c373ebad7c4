//! Live sensor channel client
//!
//! Reads JSON frames from the sensor WebSocket and feeds them into the
//! `SensorFeed`. A frame is either one reading
//! `{"key": "slot1", "occupied": true, "distance": 12.5}` or a snapshot of
//! every bay `{"slot1": {...}, "slot2": {...}}`.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::application::services::SharedSensorFeed;
use crate::config::SensorFeedSettings;
use crate::domain::sensor::{SensorPayload, SensorReading};
use crate::support::shutdown::ShutdownSignal;

#[derive(Debug)]
pub enum SensorFrameError {
    InvalidJson(String),
    NotAnObject,
    InvalidReading { key: String, reason: String },
}

impl fmt::Display for SensorFrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson(msg) => write!(f, "Invalid JSON: {}", msg),
            Self::NotAnObject => write!(f, "Sensor frame is not a JSON object"),
            Self::InvalidReading { key, reason } => write!(f, "Invalid reading for {}: {}", key, reason),
        }
    }
}

impl std::error::Error for SensorFrameError {}

/// Normalize one frame into readings, ordered by key.
pub fn parse_frame(text: &str, received_at: DateTime<Utc>) -> Result<Vec<SensorReading>, SensorFrameError> {
    let value: Value = serde_json::from_str(text).map_err(|e| SensorFrameError::InvalidJson(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(SensorFrameError::NotAnObject);
    };

    if let Some(Value::String(key)) = map.get("key") {
        let key = key.clone();
        let at = map
            .get("timestamp")
            .and_then(Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or(received_at);
        let payload: SensorPayload = serde_json::from_value(Value::Object(map)).map_err(|e| {
            SensorFrameError::InvalidReading {
                key: key.clone(),
                reason: e.to_string(),
            }
        })?;
        return Ok(vec![payload.into_reading(key, at)]);
    }

    let mut readings = Vec::with_capacity(map.len());
    for (key, raw) in map {
        if !raw.is_object() {
            continue;
        }
        let payload: SensorPayload = serde_json::from_value(raw).map_err(|e| SensorFrameError::InvalidReading {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        readings.push(payload.into_reading(key, received_at));
    }
    readings.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(readings)
}

/// Reconnecting WebSocket reader for the sensor channel
pub struct SensorFeedClient {
    url: String,
    feed: SharedSensorFeed,
    reconnect_initial: Duration,
    reconnect_max: Duration,
}

impl SensorFeedClient {
    pub fn new(url: impl Into<String>, feed: SharedSensorFeed, settings: &SensorFeedSettings) -> Self {
        Self {
            url: url.into(),
            feed,
            reconnect_initial: Duration::from_millis(settings.reconnect_initial_ms.max(1)),
            reconnect_max: Duration::from_millis(settings.reconnect_max_ms.max(settings.reconnect_initial_ms)),
        }
    }

    /// Run until shutdown on a background task.
    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: ShutdownSignal) {
        let mut delay = self.reconnect_initial;
        loop {
            if shutdown.is_triggered() {
                break;
            }
            tokio::select! {
                received = self.session() => {
                    if received {
                        delay = self.reconnect_initial;
                    }
                }
                _ = shutdown.wait() => break,
            }

            warn!(url = %self.url, retry_in_ms = delay.as_millis() as u64, "Sensor channel disconnected");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.wait() => break,
            }
            delay = (delay * 2).min(self.reconnect_max);
        }
        info!("Sensor feed client stopped");
    }

    /// One connection lifetime. Returns whether any frame was applied.
    async fn session(&self) -> bool {
        let (stream, _) = match connect_async(self.url.as_str()).await {
            Ok(ok) => ok,
            Err(e) => {
                debug!(url = %self.url, error = %e, "Sensor channel connect failed");
                return false;
            }
        };
        info!(url = %self.url, "Sensor channel connected");

        let (_, mut read) = stream.split();
        let mut applied = false;
        while let Some(message) = read.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "Sensor channel read error");
                    break;
                }
            };
            match parse_frame(&text, Utc::now()) {
                Ok(readings) => {
                    for reading in readings {
                        self.feed.ingest(reading);
                    }
                    applied = true;
                }
                Err(e) => warn!(error = %e, "Dropping sensor frame"),
            }
        }
        applied
    }
}
