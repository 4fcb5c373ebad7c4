//! Notification events
//!
//! Everything the service announces to WebSocket clients after a commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    SlotBooked(SlotBookedEvent),
    SlotReleased(SlotReleasedEvent),
    EntryApproved(EntryApprovedEvent),
    EntryRejected(EntryRejectedEvent),
    BalanceCredited(BalanceCreditedEvent),
    /// A booking debit could not be reversed and needs an operator
    ReconciliationRequired(ReconciliationRequiredEvent),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::SlotBooked(_) => "slot_booked",
            Event::SlotReleased(_) => "slot_released",
            Event::EntryApproved(_) => "entry_approved",
            Event::EntryRejected(_) => "entry_rejected",
            Event::BalanceCredited(_) => "balance_credited",
            Event::ReconciliationRequired(_) => "reconciliation_required",
        }
    }

    pub fn facility_id(&self) -> Option<&str> {
        match self {
            Event::SlotBooked(e) => Some(&e.facility_id),
            Event::SlotReleased(e) => Some(&e.facility_id),
            Event::EntryApproved(e) => Some(&e.facility_id),
            Event::EntryRejected(e) => e.facility_id.as_deref(),
            Event::BalanceCredited(_) => None,
            Event::ReconciliationRequired(e) => Some(&e.facility_id),
        }
    }

    /// The account the event concerns
    pub fn user_id(&self) -> &str {
        match self {
            Event::SlotBooked(e) => &e.user_id,
            Event::SlotReleased(e) => &e.user_id,
            Event::EntryApproved(e) => &e.user_id,
            Event::EntryRejected(e) => &e.user_id,
            Event::BalanceCredited(e) => &e.user_id,
            Event::ReconciliationRequired(e) => &e.user_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotBookedEvent {
    pub facility_id: String,
    pub slot_id: String,
    pub user_id: String,
    pub amount: i64,
    pub new_balance: i64,
    pub available_slots: u32,
    pub revision: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotReleasedEvent {
    pub facility_id: String,
    pub slot_id: String,
    /// Holder of the booking
    pub user_id: String,
    /// Who asked for the release (the holder or an administrator)
    pub released_by: String,
    pub available_slots: u32,
    pub revision: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryApprovedEvent {
    pub facility_id: String,
    pub facility_name: String,
    pub user_id: String,
    pub amount: i64,
    pub new_balance: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRejectedEvent {
    pub facility_id: Option<String>,
    pub user_id: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceCreditedEvent {
    pub user_id: String,
    pub amount: i64,
    pub new_balance: i64,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationRequiredEvent {
    pub record_id: String,
    pub user_id: String,
    pub facility_id: String,
    pub slot_id: String,
    pub amount: i64,
    pub timestamp: DateTime<Utc>,
}

/// Event wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}
