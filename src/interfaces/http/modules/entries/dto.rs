//! Entry DTOs

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::application::services::EntryReceipt;
use crate::domain::token::MAX_TOKEN_LEN;
use crate::interfaces::http::modules::accounts::LedgerEntryDto;

const TOKEN_MAX_LEN: u64 = MAX_TOKEN_LEN as u64;

/// Scanned gate token, exactly as decoded from the QR code
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EntryRequest {
    #[validate(length(min = 1, max = TOKEN_MAX_LEN))]
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EntryDto {
    pub approved: bool,
    pub facility_id: String,
    pub facility_name: String,
    pub new_balance: i64,
    pub entry: LedgerEntryDto,
    /// Repeat scan answered from the first result; nothing charged
    pub replayed: bool,
}

impl From<EntryReceipt> for EntryDto {
    fn from(r: EntryReceipt) -> Self {
        Self {
            approved: r.approved,
            facility_id: r.facility_id,
            facility_name: r.facility_name,
            new_balance: r.new_balance,
            entry: r.entry.into(),
            replayed: r.replayed,
        }
    }
}
