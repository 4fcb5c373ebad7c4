pub mod events;
pub mod services;

pub use events::{create_event_bus, Event, EventBus, EventSubscriber, SharedEventBus};
pub use services::{
    AccountService, Caller, EntryBillingService, FacilityFeed, GeoLocator, ReservationCoordinator,
    SensorFeed,
};
