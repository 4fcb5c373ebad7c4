//! Entries module: gate-token scans

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;
