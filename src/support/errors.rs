use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DomainError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Slot {slot_id} in facility {facility_id} is already booked")]
    AlreadyBooked {
        facility_id: String,
        slot_id: String,
    },

    #[error("Slot {slot_id} in facility {facility_id} is not booked")]
    NotBooked {
        facility_id: String,
        slot_id: String,
    },

    #[error("Slot {slot_id} in facility {facility_id} is held by another user")]
    NotHolder {
        facility_id: String,
        slot_id: String,
    },

    #[error("Insufficient funds: balance {balance}, debit {amount}, floor {floor}")]
    InsufficientFunds { balance: i64, amount: i64, floor: i64 },

    #[error("Insufficient balance: balance {balance}, minimum {minimum}")]
    InsufficientBalance { balance: i64, minimum: i64 },

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Duplicate scan for nonce {0} is still being processed")]
    DuplicateScan(String),

    /// The booking debit could not be reversed; a reconciliation record
    /// was written instead.
    #[error("Compensation failed for {user_id} on {facility_id}/{slot_id}: {reason}")]
    CompensationFailed {
        user_id: String,
        facility_id: String,
        slot_id: String,
        reason: String,
    },

    /// Write-write conflict reported by the store (busy/locked database,
    /// serialization failure). Retried with backoff.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl DomainError {
    /// Whether this error is likely transient and the operation may
    /// succeed if retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::Conflict(_))
    }

    /// Stable snake_case label used for metrics and API error codes.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound { .. } => "not_found",
            DomainError::Validation(_) => "validation",
            DomainError::AlreadyBooked { .. } => "already_booked",
            DomainError::NotBooked { .. } => "not_booked",
            DomainError::NotHolder { .. } => "not_holder",
            DomainError::InsufficientFunds { .. } => "insufficient_funds",
            DomainError::InsufficientBalance { .. } => "insufficient_balance",
            DomainError::InvalidToken(_) => "invalid_token",
            DomainError::LocationUnavailable(_) => "location_unavailable",
            DomainError::Unauthenticated => "unauthenticated",
            DomainError::DuplicateScan(_) => "duplicate_scan",
            DomainError::CompensationFailed { .. } => "compensation_failed",
            DomainError::Conflict(_) => "conflict",
            DomainError::Storage(_) => "storage",
        }
    }
}

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Infra(#[from] InfraError),
}

/// Map a sea-orm error onto the domain taxonomy.
///
/// SQLite reports lock contention as `database is locked` / `SQLITE_BUSY`;
/// PostgreSQL as serialization or deadlock failures. Those are transient.
pub fn map_db_err(e: sea_orm::DbErr) -> DomainError {
    let message = e.to_string();
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("database is locked")
        || lowered.contains("busy")
        || lowered.contains("could not serialize")
        || lowered.contains("deadlock")
    {
        DomainError::Conflict(message)
    } else {
        DomainError::Storage(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_transient() {
        assert!(DomainError::Conflict("database is locked".into()).is_transient());
        assert!(!DomainError::Storage("disk full".into()).is_transient());
        assert!(!DomainError::Unauthenticated.is_transient());
    }

    #[test]
    fn locked_database_maps_to_conflict() {
        let err = map_db_err(sea_orm::DbErr::Custom("database is locked".into()));
        assert!(matches!(err, DomainError::Conflict(_)));

        let err = map_db_err(sea_orm::DbErr::Custom("no such table: slots".into()));
        assert!(matches!(err, DomainError::Storage(_)));
    }

    #[test]
    fn codes_are_snake_case() {
        let err = DomainError::AlreadyBooked {
            facility_id: "1".into(),
            slot_id: "S1".into(),
        };
        assert_eq!(err.code(), "already_booked");
        assert_eq!(DomainError::InvalidToken("x".into()).code(), "invalid_token");
    }
}
