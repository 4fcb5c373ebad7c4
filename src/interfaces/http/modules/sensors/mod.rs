//! Sensors module: advisory bay readings

pub mod handlers;

pub use handlers::*;
