//! Reconciliation record entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A booking debit that could not be reversed after the slot commit failed.
///
/// Operators settle these by hand; nothing reads them back automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub id: Uuid,
    pub user_id: String,
    pub facility_id: String,
    pub slot_id: String,
    /// Amount that was debited and still needs to be returned
    pub amount: i64,
    /// Ledger entry of the orphaned debit
    pub debit_entry_id: String,
    /// Why the slot commit failed
    pub booking_error: String,
    /// Why the reversal credit failed
    pub compensation_error: String,
    pub created_at: DateTime<Utc>,
}

impl ReconciliationRecord {
    pub fn new(
        user_id: impl Into<String>,
        facility_id: impl Into<String>,
        slot_id: impl Into<String>,
        amount: i64,
        debit_entry_id: impl Into<String>,
        booking_error: impl Into<String>,
        compensation_error: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            facility_id: facility_id.into(),
            slot_id: slot_id.into(),
            amount,
            debit_entry_id: debit_entry_id.into(),
            booking_error: booking_error.into(),
            compensation_error: compensation_error.into(),
            created_at: Utc::now(),
        }
    }
}
