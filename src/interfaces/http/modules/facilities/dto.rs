//! Facility DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::application::services::{FacilityDistance, SensorFeed};
use crate::domain::sensor::{SensorReading, SlotOverlay};
use crate::domain::{Facility, FacilitySnapshot, FacilityToken, Slot};

/// Facility API representation. Amounts are minor currency units.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FacilityDto {
    pub id: String,
    pub name: String,
    pub base_rate: i64,
    pub capacity: u32,
    pub available_slots: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Increases with every committed slot change
    pub revision: u64,
}

impl From<Facility> for FacilityDto {
    fn from(f: Facility) -> Self {
        Self {
            id: f.id,
            name: f.name,
            base_rate: f.base_rate,
            capacity: f.capacity,
            available_slots: f.available_slots,
            latitude: f.location.map(|c| c.latitude),
            longitude: f.location.map(|c| c.longitude),
            revision: f.revision,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SensorReadingDto {
    pub key: String,
    pub occupied: bool,
    pub distance_cm: f64,
    pub received_at: DateTime<Utc>,
}

impl From<SensorReading> for SensorReadingDto {
    fn from(r: SensorReading) -> Self {
        Self {
            key: r.key,
            occupied: r.occupied,
            distance_cm: r.distance_cm,
            received_at: r.received_at,
        }
    }
}

/// Slot API representation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SlotDto {
    pub id: String,
    pub number: String,
    pub rate: i64,
    /// "Vacant" or "Booked"
    pub state: String,
    pub booked_by_me: bool,
    /// Holder id; only shown to administrators
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booked_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor: Option<SensorReadingDto>,
    /// Sensor and booking state disagree (display hint only)
    pub sensor_mismatch: bool,
}

impl SlotDto {
    pub fn for_viewer(slot: Slot, viewer: &str, is_admin: bool) -> Self {
        Self::from_overlay(
            SlotOverlay {
                slot,
                reading: None,
            },
            viewer,
            is_admin,
        )
    }

    pub fn from_overlay(overlay: SlotOverlay, viewer: &str, is_admin: bool) -> Self {
        let sensor_mismatch = overlay.disagrees();
        let SlotOverlay { slot, reading } = overlay;
        Self {
            state: slot.state().as_str().to_string(),
            booked_by_me: slot.is_held_by(viewer),
            booked_by: if is_admin { slot.booked_by.clone() } else { None },
            booked_at: slot.booked_at,
            id: slot.id,
            number: slot.number,
            rate: slot.rate,
            sensor: reading.map(SensorReadingDto::from),
            sensor_mismatch,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FacilitySlotsDto {
    pub facility: FacilityDto,
    pub slots: Vec<SlotDto>,
}

impl FacilitySlotsDto {
    /// Slot set as `viewer` sees it, with each bay's latest sensor reading.
    pub fn with_sensors(
        snapshot: &FacilitySnapshot,
        sensors: &SensorFeed,
        viewer: &str,
        is_admin: bool,
    ) -> Self {
        Self {
            facility: snapshot.facility.clone().into(),
            slots: sensors
                .overlay(&snapshot.slots)
                .into_iter()
                .map(|o| SlotDto::from_overlay(o, viewer, is_admin))
                .collect(),
        }
    }
}

/// Location supplied by the client
#[derive(Debug, Deserialize, IntoParams)]
pub struct NearestQuery {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NearestFacilityDto {
    pub facility: FacilityDto,
    pub distance_km: f64,
}

impl From<FacilityDistance> for NearestFacilityDto {
    fn from(d: FacilityDistance) -> Self {
        Self {
            facility: d.facility.into(),
            distance_km: d.distance_km,
        }
    }
}

/// Gate token to encode into a QR code
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FacilityTokenDto {
    pub facility_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Exact string to place in the QR code
    pub payload: String,
}

impl From<FacilityToken> for FacilityTokenDto {
    fn from(t: FacilityToken) -> Self {
        Self {
            payload: t.encode(),
            facility_id: t.facility_id,
            nonce: t.nonce,
        }
    }
}
