//! WebSocket interfaces
//!
//! - `notifications`: domain events for the authenticated caller
//! - `slot_stream`: live slot set of one facility

pub mod notifications;
pub mod slot_stream;

pub use notifications::{ws_notifications_handler, EventFilter, NotificationState};
pub use slot_stream::{ws_slot_stream_handler, SlotStreamState};
