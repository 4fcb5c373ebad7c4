//! Repository access for the domain layer
//!
//! - `RepositoryProvider` gives access to each store interface
//! - `DomainResult` is the standard result type for domain operations

use super::account::BalanceLedger;
use super::facility::OccupancyStore;
use super::reconciliation::ReconciliationLog;
use crate::support::errors::DomainError;

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

/// Provides access to all domain stores.
///
/// ```ignore
/// async fn handle(repos: &dyn RepositoryProvider) {
///     let slot = repos.occupancy().find_slot("1", "S1").await?;
///     let balance = repos.ledger().get_balance("user-1").await?;
/// }
/// ```
pub trait RepositoryProvider: Send + Sync {
    fn occupancy(&self) -> &dyn OccupancyStore;
    fn ledger(&self) -> &dyn BalanceLedger;
    fn reconciliation(&self) -> &dyn ReconciliationLog;
}
