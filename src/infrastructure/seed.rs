//! Demo facilities for an empty store

use tracing::info;

use crate::domain::facility::{Facility, OccupancyStore, Slot};
use crate::domain::geo::Coordinate;
use crate::domain::DomainResult;

/// (id, name, latitude, longitude, hourly base rate in paise)
const DEMO_FACILITIES: [(&str, &str, f64, f64, i64); 5] = [
    ("1", "City Center Lot", 28.6139, 77.209, 3000),
    ("2", "Green Park Lot", 28.5494, 77.2001, 2500),
    ("3", "Cyber City Lot", 28.4944, 77.088, 4000),
    ("4", "Airport Lot", 28.5562, 77.1, 5000),
    ("5", "Noida Sector 18 Lot", 28.5672, 77.321, 2000),
];

/// Number of City Center bays wired to the live sensor channel.
const SENSOR_BAYS: u32 = 2;

pub fn demo_facilities(slots_per_facility: u32) -> Vec<(Facility, Vec<Slot>)> {
    DEMO_FACILITIES
        .iter()
        .enumerate()
        .map(|(row, &(id, name, lat, lng, rate))| {
            let facility = Facility::new(
                id,
                name,
                rate,
                slots_per_facility,
                Some(Coordinate::new(lat, lng)),
            );
            let prefix = char::from(b'A' + row as u8);
            let slots = (1..=slots_per_facility)
                .map(|n| {
                    let slot = Slot::vacant(id, format!("S{}", n), format!("{}-{:02}", prefix, n), rate);
                    if id == "1" && n <= SENSOR_BAYS {
                        slot.with_sensor(format!("slot{}", n))
                    } else {
                        slot
                    }
                })
                .collect();
            (facility, slots)
        })
        .collect()
}

/// Provision the demo facilities when the store has none. Returns how many
/// were created.
pub async fn seed_if_empty(store: &dyn OccupancyStore, slots_per_facility: u32) -> DomainResult<usize> {
    if !store.list_facilities().await?.is_empty() {
        return Ok(0);
    }

    let mut created = 0;
    for (facility, slots) in demo_facilities(slots_per_facility.max(1)) {
        let facility = store.provision_facility(facility, slots).await?;
        info!(facility_id = %facility.id, name = %facility.name, capacity = facility.capacity, "Seeded facility");
        created += 1;
    }
    Ok(created)
}
