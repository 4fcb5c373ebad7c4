pub mod model;

pub use model::{SensorPayload, SensorReading, SlotOverlay};
