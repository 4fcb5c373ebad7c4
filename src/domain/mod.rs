pub mod account;
pub mod facility;
pub mod geo;
pub mod reconciliation;
pub mod repositories;
pub mod sensor;
pub mod token;

// Re-export commonly used types
pub use account::{BalanceLedger, LedgerEntry, UserAccount};
pub use facility::{Facility, FacilitySnapshot, OccupancyStore, Slot};
pub use reconciliation::{ReconciliationLog, ReconciliationRecord};
pub use repositories::{DomainResult, RepositoryProvider};
pub use token::FacilityToken;

// Re-export DomainError from support for convenience
pub use crate::support::errors::DomainError;
