//! Live sensor channel adapter

pub mod ws_client;

pub use ws_client::{parse_frame, SensorFeedClient, SensorFrameError};
