//! Facility and slot domain entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::geo::Coordinate;

/// Booking state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    Vacant,
    Booked,
}

impl SlotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vacant => "Vacant",
            Self::Booked => "Booked",
        }
    }
}

impl std::fmt::Display for SlotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parking facility (lot)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: String,
    pub name: String,
    /// Hourly base rate in minor currency units
    pub base_rate: i64,
    pub capacity: u32,
    /// Always `capacity - booked slots`
    pub available_slots: u32,
    pub location: Option<Coordinate>,
    /// Incremented by every committed slot transition
    pub revision: u64,
    pub created_at: DateTime<Utc>,
}

impl Facility {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        base_rate: i64,
        capacity: u32,
        location: Option<Coordinate>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            base_rate,
            capacity,
            available_slots: capacity,
            location,
            revision: 0,
            created_at: Utc::now(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.available_slots == 0
    }
}

/// An individually bookable slot within a facility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub facility_id: String,
    pub id: String,
    /// Label painted on the bay
    pub number: String,
    /// Hourly rate in minor currency units
    pub rate: i64,
    pub is_booked: bool,
    pub booked_by: Option<String>,
    pub booked_at: Option<DateTime<Utc>>,
    /// Sensor channel key reporting this bay, if any
    pub sensor_key: Option<String>,
}

impl Slot {
    pub fn vacant(
        facility_id: impl Into<String>,
        id: impl Into<String>,
        number: impl Into<String>,
        rate: i64,
    ) -> Self {
        Self {
            facility_id: facility_id.into(),
            id: id.into(),
            number: number.into(),
            rate,
            is_booked: false,
            booked_by: None,
            booked_at: None,
            sensor_key: None,
        }
    }

    pub fn with_sensor(mut self, key: impl Into<String>) -> Self {
        self.sensor_key = Some(key.into());
        self
    }

    pub fn state(&self) -> SlotState {
        if self.is_booked {
            SlotState::Booked
        } else {
            SlotState::Vacant
        }
    }

    pub fn is_held_by(&self, user_id: &str) -> bool {
        self.is_booked && self.booked_by.as_deref() == Some(user_id)
    }

    /// Vacant → Booked. Returns `false` (and changes nothing) if already booked.
    pub fn book(&mut self, holder: &str, at: DateTime<Utc>) -> bool {
        if self.is_booked {
            return false;
        }
        self.is_booked = true;
        self.booked_by = Some(holder.to_string());
        self.booked_at = Some(at);
        true
    }

    /// Booked → Vacant. Returns `false` (and changes nothing) if vacant.
    pub fn vacate(&mut self) -> bool {
        if !self.is_booked {
            return false;
        }
        self.is_booked = false;
        self.booked_by = None;
        self.booked_at = None;
        true
    }
}

/// Facility together with its full slot set, read at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilitySnapshot {
    pub facility: Facility,
    pub slots: Vec<Slot>,
}

impl FacilitySnapshot {
    pub fn revision(&self) -> u64 {
        self.facility.revision
    }

    pub fn booked_count(&self) -> u32 {
        self.slots.iter().filter(|s| s.is_booked).count() as u32
    }

    /// `available_slots == capacity - booked`
    pub fn is_consistent(&self) -> bool {
        self.facility.capacity.checked_sub(self.booked_count()) == Some(self.facility.available_slots)
    }
}

/// Result of a committed slot transition.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotCommit {
    pub slot: Slot,
    /// Facility as of the commit (counter and revision already updated)
    pub facility: Facility,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_slot() -> Slot {
        Slot::vacant("lot-a", "S1", "A-01", 2000)
    }

    #[test]
    fn new_slot_is_vacant() {
        let s = sample_slot();
        assert_eq!(s.state(), SlotState::Vacant);
        assert!(s.booked_by.is_none());
        assert!(s.booked_at.is_none());
    }

    #[test]
    fn book_sets_holder_and_timestamp() {
        let mut s = sample_slot();
        let now = Utc::now();
        assert!(s.book("user-1", now));
        assert_eq!(s.state(), SlotState::Booked);
        assert!(s.is_held_by("user-1"));
        assert!(!s.is_held_by("user-2"));
        assert_eq!(s.booked_at, Some(now));
    }

    #[test]
    fn double_book_is_rejected_without_side_effects() {
        let mut s = sample_slot();
        let first = Utc::now();
        assert!(s.book("user-1", first));
        assert!(!s.book("user-2", Utc::now()));
        assert_eq!(s.booked_by.as_deref(), Some("user-1"));
        assert_eq!(s.booked_at, Some(first));
    }

    #[test]
    fn vacate_clears_booking_fields() {
        let mut s = sample_slot();
        s.book("user-1", Utc::now());
        assert!(s.vacate());
        assert_eq!(s, sample_slot());
        assert!(!s.vacate());
    }

    #[test]
    fn snapshot_consistency_tracks_counter() {
        let mut facility = Facility::new("lot-a", "Lot A", 2000, 2, None);
        let mut booked = Slot::vacant("lot-a", "S1", "A-01", 2000);
        booked.book("u", Utc::now());
        let vacant = Slot::vacant("lot-a", "S2", "A-02", 2000);

        facility.available_slots = 1;
        let snap = FacilitySnapshot {
            facility: facility.clone(),
            slots: vec![booked.clone(), vacant.clone()],
        };
        assert!(snap.is_consistent());
        assert_eq!(snap.booked_count(), 1);

        facility.available_slots = 2;
        let broken = FacilitySnapshot {
            facility,
            slots: vec![booked, vacant],
        };
        assert!(!broken.is_consistent());
    }
}
