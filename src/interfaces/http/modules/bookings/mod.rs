//! Bookings module: book and release slots

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;
