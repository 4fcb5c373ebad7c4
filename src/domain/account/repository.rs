//! Balance ledger interface

use async_trait::async_trait;

use super::model::{
    CreditRequest, DebitRequest, Identity, LedgerEntry, LedgerReceipt, ProfileUpdate, UserAccount,
};
use crate::domain::DomainResult;

/// Durable per-user balance with an append-only transaction history.
///
/// `debit` checks and applies in one atomic unit, and every successful
/// debit/credit appends exactly one [`LedgerEntry`] in that same unit.
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// Create the account on first authentication, refresh `last_login_at`
    /// otherwise.
    async fn ensure_account(&self, identity: &Identity) -> DomainResult<UserAccount>;

    async fn get_account(&self, user_id: &str) -> DomainResult<Option<UserAccount>>;

    /// `NotFound` when the account does not exist.
    async fn get_balance(&self, user_id: &str) -> DomainResult<i64>;

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> DomainResult<UserAccount>;

    async fn debit(&self, request: &DebitRequest) -> DomainResult<LedgerReceipt>;

    async fn credit(&self, request: &CreditRequest) -> DomainResult<LedgerReceipt>;

    /// Newest first.
    async fn list_transactions(&self, user_id: &str, limit: Option<u64>) -> DomainResult<Vec<LedgerEntry>>;
}
