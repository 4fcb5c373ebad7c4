//! Application services

mod accounts;
mod entry_billing;
mod facility_feed;
mod geo_locator;
mod reservation;
mod sensor_feed;

pub use accounts::{AccountService, MAX_TOP_UP};
pub use entry_billing::{EntryBillingService, EntryPolicy, EntryReceipt};
pub use facility_feed::{FacilityFeed, FacilitySubscription};
pub use geo_locator::{FacilityDistance, GeoLocator, LocationProvider, RequestLocation};
pub use reservation::{BookingReceipt, Caller, ReleaseReceipt, ReservationCoordinator};
pub use sensor_feed::{SensorFeed, SensorSubscription, SharedSensorFeed};
