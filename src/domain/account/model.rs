//! User account and ledger entry entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, DomainResult};

/// Prepaid account of an authenticated user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Opaque subject issued by the identity provider
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub phone: String,
    /// Registered number plates
    pub vehicles: Vec<String>,
    pub vehicle_type: String,
    /// Minor currency units; mutated only through the ledger
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserAccount {
    /// Fresh account for a first-time identity. Balance starts at zero.
    pub fn from_identity(identity: &Identity) -> Self {
        let now = Utc::now();
        Self {
            id: identity.user_id.clone(),
            display_name: identity
                .display_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Unnamed User".to_string()),
            email: identity.email.clone().unwrap_or_default(),
            phone: String::new(),
            vehicles: Vec::new(),
            vehicle_type: String::new(),
            balance: 0,
            created_at: now,
            last_login_at: Some(now),
        }
    }

    pub fn apply_profile(&mut self, update: &ProfileUpdate) {
        if let Some(phone) = &update.phone {
            self.phone = phone.clone();
        }
        if let Some(vehicles) = &update.vehicles {
            self.vehicles = normalize_plates(vehicles);
        }
        if let Some(vehicle_type) = &update.vehicle_type {
            self.vehicle_type = vehicle_type.clone();
        }
    }
}

/// What the identity provider tells us about a caller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identity {
    pub user_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

/// Non-core profile update; never touches the balance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub phone: Option<String>,
    pub vehicles: Option<Vec<String>>,
    pub vehicle_type: Option<String>,
}

/// Upper-cases plates, drops blanks and duplicates, keeps order.
pub fn normalize_plates(plates: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(plates.len());
    for plate in plates {
        let p: String = plate.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        if !p.is_empty() && !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

/// What a ledger entry refers to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReference {
    pub facility_id: Option<String>,
    pub slot_id: Option<String>,
}

impl LedgerReference {
    pub fn slot(facility_id: &str, slot_id: &str) -> Self {
        Self {
            facility_id: Some(facility_id.to_string()),
            slot_id: Some(slot_id.to_string()),
        }
    }

    pub fn facility(facility_id: &str) -> Self {
        Self {
            facility_id: Some(facility_id.to_string()),
            slot_id: None,
        }
    }
}

/// Immutable transaction record. Negative amount = debit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    pub description: String,
    pub reference: LedgerReference,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        user_id: &str,
        amount: i64,
        description: impl Into<String>,
        reference: LedgerReference,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            amount,
            description: description.into(),
            reference,
            created_at: Utc::now(),
        }
    }

    pub fn is_debit(&self) -> bool {
        self.amount < 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebitRequest {
    pub user_id: String,
    /// Positive amount to take
    pub amount: i64,
    pub description: String,
    pub reference: LedgerReference,
    /// Balance the account must hold before the debit is considered
    /// (`InsufficientBalance` otherwise). Checked before the ledger floor.
    pub required_balance: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreditRequest {
    pub user_id: String,
    /// Positive amount to add
    pub amount: i64,
    pub description: String,
    pub reference: LedgerReference,
}

/// Outcome of a committed ledger mutation
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerReceipt {
    pub entry: LedgerEntry,
    pub new_balance: i64,
}

pub fn validate_amount(amount: i64) -> DomainResult<()> {
    if amount <= 0 {
        return Err(DomainError::Validation(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

/// Decide whether a debit may proceed against `balance`.
///
/// Shared by every ledger implementation so the rejection precedence is
/// identical: the entry threshold first, then the floor.
pub fn check_debit(balance: i64, request: &DebitRequest, floor: i64) -> DomainResult<()> {
    if let Some(minimum) = request.required_balance {
        if balance < minimum {
            return Err(DomainError::InsufficientBalance { balance, minimum });
        }
    }
    let within_floor = balance
        .checked_sub(request.amount)
        .is_some_and(|rest| rest >= floor);
    if !within_floor {
        return Err(DomainError::InsufficientFunds {
            balance,
            amount: request.amount,
            floor,
        });
    }
    Ok(())
}
