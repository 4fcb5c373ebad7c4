use async_trait::async_trait;

use super::model::ReconciliationRecord;
use crate::domain::DomainResult;

/// Durable log of debits awaiting manual reconciliation
#[async_trait]
pub trait ReconciliationLog: Send + Sync {
    async fn record(&self, record: &ReconciliationRecord) -> DomainResult<()>;

    /// Oldest first.
    async fn list(&self) -> DomainResult<Vec<ReconciliationRecord>>;
}
