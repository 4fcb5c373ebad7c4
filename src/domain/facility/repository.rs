//! Occupancy store interface

use async_trait::async_trait;

use super::model::{Facility, FacilitySnapshot, Slot, SlotCommit};
use crate::domain::DomainResult;

/// Authoritative record of slot booking state.
///
/// `try_book` and `release` are compare-and-set transitions: the slot flag,
/// the facility's `available_slots` counter and its `revision` change in one
/// atomic unit, or not at all.
#[async_trait]
pub trait OccupancyStore: Send + Sync {
    /// Create a facility together with its slots (administrator path).
    /// `available_slots` is derived from the slots, not taken from input.
    async fn provision_facility(&self, facility: Facility, slots: Vec<Slot>) -> DomainResult<Facility>;

    async fn list_facilities(&self) -> DomainResult<Vec<Facility>>;

    async fn find_facility(&self, facility_id: &str) -> DomainResult<Option<Facility>>;

    async fn find_slot(&self, facility_id: &str, slot_id: &str) -> DomainResult<Option<Slot>>;

    /// Facility and all of its slots, read consistently.
    async fn snapshot(&self, facility_id: &str) -> DomainResult<FacilitySnapshot>;

    /// Vacant → Booked. `AlreadyBooked` when the slot is taken.
    async fn try_book(&self, facility_id: &str, slot_id: &str, holder: &str) -> DomainResult<SlotCommit>;

    /// Booked → Vacant for the slot held by `holder`. `NotBooked` when the
    /// slot is vacant, `NotHolder` when someone else holds it.
    async fn release(&self, facility_id: &str, slot_id: &str, holder: &str) -> DomainResult<SlotCommit>;
}
