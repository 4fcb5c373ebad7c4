//! SeaORM implementation of RepositoryProvider

use sea_orm::DatabaseConnection;

use crate::domain::repositories::RepositoryProvider;
use crate::domain::{BalanceLedger, OccupancyStore, ReconciliationLog};

use super::ledger_repository::SeaOrmLedgerRepository;
use super::occupancy_repository::SeaOrmOccupancyRepository;
use super::reconciliation_repository::SeaOrmReconciliationRepository;

/// Unified repository provider backed by SeaORM.
///
/// Holds one connection pool and exposes per-store accessors.
///
/// ```ignore
/// let repos = SeaOrmRepositoryProvider::new(db.clone(), 0);
/// let snapshot = repos.occupancy().snapshot("1").await?;
/// let balance = repos.ledger().get_balance("user-1").await?;
/// ```
pub struct SeaOrmRepositoryProvider {
    occupancy: SeaOrmOccupancyRepository,
    ledger: SeaOrmLedgerRepository,
    reconciliation: SeaOrmReconciliationRepository,
}

impl SeaOrmRepositoryProvider {
    pub fn new(db: DatabaseConnection, ledger_floor: i64) -> Self {
        Self {
            occupancy: SeaOrmOccupancyRepository::new(db.clone()),
            ledger: SeaOrmLedgerRepository::new(db.clone(), ledger_floor),
            reconciliation: SeaOrmReconciliationRepository::new(db),
        }
    }
}

impl RepositoryProvider for SeaOrmRepositoryProvider {
    fn occupancy(&self) -> &dyn OccupancyStore {
        &self.occupancy
    }

    fn ledger(&self) -> &dyn BalanceLedger {
        &self.ledger
    }

    fn reconciliation(&self) -> &dyn ReconciliationLog {
        &self.reconciliation
    }
}
