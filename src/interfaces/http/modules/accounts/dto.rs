//! Account DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::application::services::MAX_TOP_UP;
use crate::domain::account::{LedgerReceipt, ProfileUpdate};
use crate::domain::{LedgerEntry, UserAccount};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccountDto {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub phone: String,
    pub vehicles: Vec<String>,
    pub vehicle_type: String,
    /// Minor currency units
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<UserAccount> for AccountDto {
    fn from(a: UserAccount) -> Self {
        Self {
            id: a.id,
            display_name: a.display_name,
            email: a.email,
            phone: a.phone,
            vehicles: a.vehicles,
            vehicle_type: a.vehicle_type,
            balance: a.balance,
            created_at: a.created_at,
            last_login_at: a.last_login_at,
        }
    }
}

/// Ledger entry. Negative amount = debit.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LedgerEntryDto {
    pub id: String,
    pub amount: i64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryDto {
    fn from(e: LedgerEntry) -> Self {
        Self {
            id: e.id,
            amount: e.amount,
            description: e.description,
            facility_id: e.reference.facility_id,
            slot_id: e.reference.slot_id,
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceChangeDto {
    pub new_balance: i64,
    pub entry: LedgerEntryDto,
}

impl From<LedgerReceipt> for BalanceChangeDto {
    fn from(r: LedgerReceipt) -> Self {
        Self {
            new_balance: r.new_balance,
            entry: r.entry.into(),
        }
    }
}

/// Profile update; omitted fields are left unchanged
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(length(max = 10))]
    pub vehicles: Option<Vec<String>>,
    #[validate(length(max = 32))]
    pub vehicle_type: Option<String>,
}

impl From<UpdateProfileRequest> for ProfileUpdate {
    fn from(r: UpdateProfileRequest) -> Self {
        Self {
            phone: r.phone,
            vehicles: r.vehicles,
            vehicle_type: r.vehicle_type,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TopUpRequest {
    /// Minor currency units
    #[validate(range(min = 1, max = MAX_TOP_UP))]
    pub amount: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TransactionsQuery {
    /// Newest entries first; all when omitted
    pub limit: Option<u64>,
}
