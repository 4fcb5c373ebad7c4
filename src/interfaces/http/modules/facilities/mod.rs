//! Facilities module: listing, nearest lookup, slot overlay, gate tokens

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;
