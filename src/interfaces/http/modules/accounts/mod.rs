//! Account module: profile, wallet top-up, transaction history

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;
