pub mod accounts;
pub mod bookings;
pub mod entries;
pub mod facilities;
pub mod health;
pub mod metrics;
pub mod sensors;
