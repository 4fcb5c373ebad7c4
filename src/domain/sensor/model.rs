//! Sensor reading entity
//!
//! Readings are advisory: they are shown next to slots but never decide a
//! booking or a charge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::facility::Slot;

/// Latest reading of one ultrasonic bay sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub key: String,
    pub occupied: bool,
    /// Measured distance to the nearest object, in centimetres
    pub distance_cm: f64,
    pub received_at: DateTime<Utc>,
}

/// Raw per-key payload as pushed by the sensor channel
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SensorPayload {
    #[serde(default)]
    pub occupied: bool,
    #[serde(default)]
    pub distance: f64,
}

impl SensorPayload {
    pub fn into_reading(self, key: impl Into<String>, received_at: DateTime<Utc>) -> SensorReading {
        SensorReading {
            key: key.into(),
            occupied: self.occupied,
            distance_cm: if self.distance.is_finite() { self.distance } else { 0.0 },
            received_at,
        }
    }
}

/// A slot as shown to users: booking state plus whatever the sensor says
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotOverlay {
    pub slot: Slot,
    pub reading: Option<SensorReading>,
}

impl SlotOverlay {
    /// Booked-but-empty or vacant-but-occupied. Display only.
    pub fn disagrees(&self) -> bool {
        self.reading
            .as_ref()
            .is_some_and(|r| r.occupied != self.slot.is_booked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_defaults_missing_fields() {
        let p: SensorPayload = serde_json::from_str(r#"{"occupied": true}"#).unwrap();
        assert!(p.occupied);
        assert_eq!(p.distance, 0.0);
    }

    #[test]
    fn overlay_flags_disagreement() {
        let slot = Slot::vacant("lot", "S1", "A-01", 100).with_sensor("slot1");
        let reading = SensorPayload {
            occupied: true,
            distance: 12.5,
        }
        .into_reading("slot1", Utc::now());

        let overlay = SlotOverlay {
            slot: slot.clone(),
            reading: Some(reading),
        };
        assert!(overlay.disagrees());

        let without = SlotOverlay { slot, reading: None };
        assert!(!without.disagrees());
    }
}
