//! Account service: first-login provisioning, profile, wallet top-up

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::application::events::{BalanceCreditedEvent, Event, SharedEventBus};
use crate::domain::account::{
    CreditRequest, Identity, LedgerEntry, LedgerReceipt, LedgerReference, ProfileUpdate, UserAccount,
};
use crate::domain::{DomainError, DomainResult, RepositoryProvider};
use crate::support::retry::{retry_with_backoff, RetryConfig};

/// Largest single top-up accepted, in minor units.
pub const MAX_TOP_UP: i64 = 10_000_000;

pub struct AccountService {
    repos: Arc<dyn RepositoryProvider>,
    event_bus: SharedEventBus,
    retry: RetryConfig,
}

impl AccountService {
    pub fn new(repos: Arc<dyn RepositoryProvider>, event_bus: SharedEventBus, retry: RetryConfig) -> Self {
        Self {
            repos,
            event_bus,
            retry,
        }
    }

    /// Called on every authenticated request.
    pub async fn ensure(&self, identity: &Identity) -> DomainResult<UserAccount> {
        if identity.user_id.trim().is_empty() {
            return Err(DomainError::Unauthenticated);
        }
        retry_with_backoff(
            &self.retry,
            || self.repos.ledger().ensure_account(identity),
            DomainError::is_transient,
            "ensure_account",
        )
        .await
    }

    pub async fn get(&self, user_id: &str) -> DomainResult<UserAccount> {
        self.repos
            .ledger()
            .get_account(user_id)
            .await?
            .ok_or_else(|| DomainError::NotFound {
                entity: "UserAccount",
                field: "id",
                value: user_id.to_string(),
            })
    }

    pub async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> DomainResult<UserAccount> {
        retry_with_backoff(
            &self.retry,
            || self.repos.ledger().update_profile(user_id, update),
            DomainError::is_transient,
            "update_profile",
        )
        .await
    }

    /// Add funds to the caller's wallet.
    pub async fn top_up(&self, user_id: &str, amount: i64) -> DomainResult<LedgerReceipt> {
        if amount > MAX_TOP_UP {
            return Err(DomainError::Validation(format!(
                "top-up above {} is not allowed",
                MAX_TOP_UP
            )));
        }
        let request = CreditRequest {
            user_id: user_id.to_string(),
            amount,
            description: "Wallet top-up".to_string(),
            reference: LedgerReference::default(),
        };
        let receipt = retry_with_backoff(
            &self.retry,
            || self.repos.ledger().credit(&request),
            DomainError::is_transient,
            "ledger_top_up",
        )
        .await?;

        info!(user_id, amount, new_balance = receipt.new_balance, "Wallet topped up");
        self.event_bus.publish(Event::BalanceCredited(BalanceCreditedEvent {
            user_id: user_id.to_string(),
            amount,
            new_balance: receipt.new_balance,
            description: request.description.clone(),
            timestamp: Utc::now(),
        }));
        Ok(receipt)
    }

    pub async fn transactions(&self, user_id: &str, limit: Option<u64>) -> DomainResult<Vec<LedgerEntry>> {
        self.repos.ledger().list_transactions(user_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::create_event_bus;
    use crate::infrastructure::storage::InMemoryRepositoryProvider;

    fn service() -> AccountService {
        AccountService::new(
            Arc::new(InMemoryRepositoryProvider::new(0)),
            create_event_bus(),
            RetryConfig::default(),
        )
    }

    #[tokio::test]
    async fn top_up_credits_and_records() {
        let svc = service();
        svc.ensure(&Identity::new("u1")).await.unwrap();
        let receipt = svc.top_up("u1", 5000).await.unwrap();
        assert_eq!(receipt.new_balance, 5000);

        let history = svc.transactions("u1", None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].amount, 5000);
        assert_eq!(svc.get("u1").await.unwrap().balance, 5000);
    }

    #[tokio::test]
    async fn top_up_bounds() {
        let svc = service();
        svc.ensure(&Identity::new("u1")).await.unwrap();
        assert!(matches!(svc.top_up("u1", 0).await, Err(DomainError::Validation(_))));
        assert!(matches!(
            svc.top_up("u1", MAX_TOP_UP + 1).await,
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(svc.top_up("ghost", 100).await, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn blank_identity_is_unauthenticated() {
        let svc = service();
        assert!(matches!(
            svc.ensure(&Identity::new("  ")).await,
            Err(DomainError::Unauthenticated)
        ));
    }
}
