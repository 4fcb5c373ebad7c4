//! Facility aggregate
//!
//! Contains the Facility and Slot entities and the occupancy store interface.

pub mod model;
pub mod repository;

pub use model::{Facility, FacilitySnapshot, Slot, SlotCommit, SlotState};
pub use repository::OccupancyStore;
