//! Entry billing
//!
//! Charges the fixed entry fee when a user scans a facility's gate code.
//! Independent of slot bookings; the occupancy store is only read to
//! resolve the facility named in the token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, warn};

use crate::application::events::{Event, EntryApprovedEvent, EntryRejectedEvent, SharedEventBus};
use crate::application::services::Caller;
use crate::config::BillingSettings;
use crate::domain::account::{DebitRequest, LedgerEntry, LedgerReference};
use crate::domain::{DomainError, DomainResult, FacilityToken, RepositoryProvider};
use crate::support::retry::{retry_with_backoff, RetryConfig};

#[derive(Debug, Clone)]
pub struct EntryPolicy {
    pub entry_fee: i64,
    /// Balance required before the fee is considered
    pub minimum_balance: i64,
    /// How long a scanned nonce is remembered
    pub dedupe_window: Duration,
}

impl From<&BillingSettings> for EntryPolicy {
    fn from(s: &BillingSettings) -> Self {
        Self {
            entry_fee: s.entry_fee,
            minimum_balance: s.minimum_entry_balance,
            dedupe_window: Duration::from_secs(s.entry_dedupe_window_secs),
        }
    }
}

impl Default for EntryPolicy {
    fn default() -> Self {
        Self::from(&BillingSettings::default())
    }
}

#[derive(Debug, Clone)]
pub struct EntryReceipt {
    pub approved: bool,
    pub facility_id: String,
    pub facility_name: String,
    pub new_balance: i64,
    pub entry: LedgerEntry,
    /// Repeat scan of an already charged nonce; nothing was charged
    pub replayed: bool,
}

enum ScanState {
    InFlight { since: Instant },
    Done { receipt: EntryReceipt, at: Instant },
}

type ScanMap = DashMap<(String, String), ScanState>;

pub struct EntryBillingService {
    repos: Arc<dyn RepositoryProvider>,
    event_bus: SharedEventBus,
    policy: EntryPolicy,
    retry: RetryConfig,
    scans: Arc<ScanMap>,
}

impl EntryBillingService {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        event_bus: SharedEventBus,
        policy: EntryPolicy,
        retry: RetryConfig,
    ) -> Self {
        Self {
            repos,
            event_bus,
            policy,
            retry,
            scans: Arc::new(DashMap::new()),
        }
    }

    pub fn policy(&self) -> &EntryPolicy {
        &self.policy
    }

    pub async fn process_entry(&self, caller: &Caller, raw_token: &str) -> DomainResult<EntryReceipt> {
        let user_id = caller.require_authenticated()?.to_string();
        let result = self.process(&user_id, raw_token).await;

        let outcome = match &result {
            Ok(r) if r.replayed => "replayed",
            Ok(_) => "approved",
            Err(e) => e.code(),
        };
        metrics::counter!("parking_entries_total", "outcome" => outcome).increment(1);

        match &result {
            Ok(receipt) if !receipt.replayed => {
                info!(
                    user_id = %user_id,
                    facility_id = %receipt.facility_id,
                    fee = self.policy.entry_fee,
                    new_balance = receipt.new_balance,
                    "Entry approved"
                );
                self.event_bus.publish(Event::EntryApproved(EntryApprovedEvent {
                    facility_id: receipt.facility_id.clone(),
                    facility_name: receipt.facility_name.clone(),
                    user_id: user_id.clone(),
                    amount: self.policy.entry_fee,
                    new_balance: receipt.new_balance,
                    timestamp: Utc::now(),
                }));
            }
            Ok(receipt) => {
                info!(user_id = %user_id, facility_id = %receipt.facility_id, "Entry scan replayed")
            }
            Err(DomainError::DuplicateScan(_)) => {}
            Err(e) => {
                info!(user_id = %user_id, outcome = e.code(), "Entry rejected");
                self.event_bus.publish(Event::EntryRejected(EntryRejectedEvent {
                    facility_id: FacilityToken::parse(raw_token).ok().map(|t| t.facility_id),
                    user_id: user_id.clone(),
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                }));
            }
        }
        result
    }

    async fn process(&self, user_id: &str, raw_token: &str) -> DomainResult<EntryReceipt> {
        let token = FacilityToken::parse(raw_token)?;

        let facility = self
            .repos
            .occupancy()
            .find_facility(&token.facility_id)
            .await?
            .ok_or_else(|| {
                DomainError::InvalidToken(format!("unknown facility {}", token.facility_id))
            })?;

        let request = self.debit_request(user_id, &facility.id, &facility.name);

        let Some(nonce) = token.nonce.clone() else {
            warn!(user_id, facility_id = %facility.id, "Entry token has no nonce, charging without de-duplication");
            return charge(self.repos.as_ref(), &self.retry, &request, &facility.name).await;
        };

        self.prune_expired();
        let key = (user_id.to_string(), nonce.clone());
        match self.scans.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let cached = match occupied.get() {
                    ScanState::InFlight { .. } => return Err(DomainError::DuplicateScan(nonce)),
                    ScanState::Done { receipt, at } if at.elapsed() < self.policy.dedupe_window => {
                        Some(receipt.clone())
                    }
                    ScanState::Done { .. } => None,
                };
                match cached {
                    Some(mut replay) => {
                        replay.replayed = true;
                        return Ok(replay);
                    }
                    None => {
                        occupied.insert(ScanState::InFlight { since: Instant::now() });
                    }
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ScanState::InFlight { since: Instant::now() });
            }
        }

        // The debit and the nonce bookkeeping finish on their own task, so a
        // dropped request leaves the nonce either charged or free again.
        let repos = Arc::clone(&self.repos);
        let retry = self.retry.clone();
        let scans = Arc::clone(&self.scans);
        let facility_name = facility.name.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let result = charge(repos.as_ref(), &retry, &request, &facility_name).await;
            match &result {
                Ok(receipt) => {
                    scans.insert(
                        task_key,
                        ScanState::Done {
                            receipt: receipt.clone(),
                            at: Instant::now(),
                        },
                    );
                }
                Err(_) => {
                    scans.remove(&task_key);
                }
            }
            result
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                self.scans.remove(&key);
                Err(DomainError::Storage(format!("entry charge task failed: {}", e)))
            }
        }
    }

    fn debit_request(&self, user_id: &str, facility_id: &str, facility_name: &str) -> DebitRequest {
        DebitRequest {
            user_id: user_id.to_string(),
            amount: self.policy.entry_fee,
            description: format!("Entry at {}", facility_name),
            reference: LedgerReference::facility(facility_id),
            required_balance: Some(self.policy.minimum_balance),
        }
    }

    /// Fresh gate token for a facility.
    pub async fn issue_token(&self, facility_id: &str) -> DomainResult<FacilityToken> {
        let facility = self
            .repos
            .occupancy()
            .find_facility(facility_id)
            .await?
            .ok_or_else(|| DomainError::NotFound {
                entity: "Facility",
                field: "id",
                value: facility_id.to_string(),
            })?;
        Ok(FacilityToken::issue(&facility))
    }

    fn prune_expired(&self) {
        let window = self.policy.dedupe_window;
        // An in-flight marker older than the window belongs to a charge
        // that never reported back.
        self.scans.retain(|_, state| match state {
            ScanState::InFlight { since } => since.elapsed() < window,
            ScanState::Done { at, .. } => at.elapsed() < window,
        });
    }
}

async fn charge(
    repos: &dyn RepositoryProvider,
    retry: &RetryConfig,
    request: &DebitRequest,
    facility_name: &str,
) -> DomainResult<EntryReceipt> {
    let ledger = repos.ledger();
    let receipt = retry_with_backoff(
        retry,
        || ledger.debit(request),
        DomainError::is_transient,
        "ledger_entry_debit",
    )
    .await?;

    Ok(EntryReceipt {
        approved: true,
        facility_id: request.reference.facility_id.clone().unwrap_or_default(),
        facility_name: facility_name.to_string(),
        new_balance: receipt.new_balance,
        entry: receipt.entry,
        replayed: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::create_event_bus;
    use crate::domain::account::{
        BalanceLedger, CreditRequest, Identity, LedgerReceipt, ProfileUpdate, UserAccount,
    };
    use crate::domain::facility::{Facility, Slot};
    use crate::infrastructure::storage::{
        InMemoryBalanceLedger, InMemoryOccupancyStore, InMemoryReconciliationLog,
        InMemoryRepositoryProvider,
    };
    use async_trait::async_trait;

    fn policy() -> EntryPolicy {
        EntryPolicy {
            entry_fee: 2000,
            minimum_balance: 2000,
            dedupe_window: Duration::from_secs(300),
        }
    }

    /// Ledger whose debits take a while to land.
    struct SlowLedger {
        inner: InMemoryBalanceLedger,
        debit_delay: Duration,
    }

    #[async_trait]
    impl BalanceLedger for SlowLedger {
        async fn ensure_account(&self, identity: &Identity) -> DomainResult<UserAccount> {
            self.inner.ensure_account(identity).await
        }
        async fn get_account(&self, user_id: &str) -> DomainResult<Option<UserAccount>> {
            self.inner.get_account(user_id).await
        }
        async fn get_balance(&self, user_id: &str) -> DomainResult<i64> {
            self.inner.get_balance(user_id).await
        }
        async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> DomainResult<UserAccount> {
            self.inner.update_profile(user_id, update).await
        }
        async fn debit(&self, request: &DebitRequest) -> DomainResult<LedgerReceipt> {
            tokio::time::sleep(self.debit_delay).await;
            self.inner.debit(request).await
        }
        async fn credit(&self, request: &CreditRequest) -> DomainResult<LedgerReceipt> {
            self.inner.credit(request).await
        }
        async fn list_transactions(&self, user_id: &str, limit: Option<u64>) -> DomainResult<Vec<LedgerEntry>> {
            self.inner.list_transactions(user_id, limit).await
        }
    }

    async fn service_with_balance(balance: i64, policy: EntryPolicy) -> (Arc<EntryBillingService>, Arc<dyn RepositoryProvider>) {
        let repos: Arc<dyn RepositoryProvider> = Arc::new(InMemoryRepositoryProvider::new(0));
        service_over(repos, balance, policy).await
    }

    async fn service_over(
        repos: Arc<dyn RepositoryProvider>,
        balance: i64,
        policy: EntryPolicy,
    ) -> (Arc<EntryBillingService>, Arc<dyn RepositoryProvider>) {
        repos
            .occupancy()
            .provision_facility(
                Facility::new("1", "City Center Lot", 2000, 1, None),
                vec![Slot::vacant("1", "S1", "A-01", 2000)],
            )
            .await
            .unwrap();
        repos.ledger().ensure_account(&Identity::new("u1")).await.unwrap();
        if balance > 0 {
            repos
                .ledger()
                .credit(&CreditRequest {
                    user_id: "u1".into(),
                    amount: balance,
                    description: "seed".into(),
                    reference: LedgerReference::default(),
                })
                .await
                .unwrap();
        }
        let service = Arc::new(EntryBillingService::new(
            repos.clone(),
            create_event_bus(),
            policy,
            RetryConfig::default(),
        ));
        (service, repos)
    }

    #[tokio::test]
    async fn insufficient_balance_charges_nothing() {
        let (service, repos) = service_with_balance(1500, policy()).await;
        let err = service
            .process_entry(&Caller::user("u1"), r#"{"lotId": 1}"#)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::InsufficientBalance { balance: 1500, minimum: 2000 }
        ));
        assert_eq!(repos.ledger().get_balance("u1").await.unwrap(), 1500);
        // Only the seed credit.
        assert_eq!(repos.ledger().list_transactions("u1", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn approved_entry_debits_fee_with_facility_reference() {
        let (service, repos) = service_with_balance(5000, policy()).await;
        let receipt = service
            .process_entry(&Caller::user("u1"), "https://smartparking.app/scan?lotId=1")
            .await
            .unwrap();
        assert!(receipt.approved);
        assert!(!receipt.replayed);
        assert_eq!(receipt.new_balance, 3000);
        assert_eq!(receipt.entry.amount, -2000);
        assert_eq!(receipt.entry.reference.facility_id.as_deref(), Some("1"));
        assert!(receipt.entry.reference.slot_id.is_none());

        // No slot interaction.
        let facility = repos.occupancy().find_facility("1").await.unwrap().unwrap();
        assert_eq!(facility.available_slots, 1);
        assert_eq!(facility.revision, 0);
    }

    #[tokio::test]
    async fn bad_tokens_are_invalid_and_free() {
        let (service, repos) = service_with_balance(5000, policy()).await;
        for raw in ["garbage", r#"{"lotId": "999"}"#, ""] {
            assert!(matches!(
                service.process_entry(&Caller::user("u1"), raw).await,
                Err(DomainError::InvalidToken(_))
            ));
        }
        assert_eq!(repos.ledger().get_balance("u1").await.unwrap(), 5000);
    }

    #[tokio::test]
    async fn anonymous_caller_is_rejected() {
        let (service, _) = service_with_balance(5000, policy()).await;
        assert!(matches!(
            service.process_entry(&Caller::anonymous(), r#"{"lotId": 1}"#).await,
            Err(DomainError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn repeated_nonce_is_replayed_not_charged() {
        let (service, repos) = service_with_balance(10000, policy()).await;
        let token = r#"{"lotId": "1", "nonce": "n-1"}"#;

        let first = service.process_entry(&Caller::user("u1"), token).await.unwrap();
        let second = service.process_entry(&Caller::user("u1"), token).await.unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(second.entry.id, first.entry.id);
        assert_eq!(repos.ledger().get_balance("u1").await.unwrap(), 8000);
    }

    #[tokio::test]
    async fn concurrent_scans_of_one_nonce_charge_once() {
        let (service, repos) = service_with_balance(10000, policy()).await;
        let token = r#"{"lotId": "1", "nonce": "n-2"}"#;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.process_entry(&Caller::user("u1"), token).await
            }));
        }
        let mut charged = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(r) if !r.replayed => charged += 1,
                Ok(_) | Err(DomainError::DuplicateScan(_)) => {}
                Err(e) => panic!("unexpected {e}"),
            }
        }
        assert_eq!(charged, 1);
        assert_eq!(repos.ledger().get_balance("u1").await.unwrap(), 8000);
    }

    #[tokio::test]
    async fn dropped_scan_settles_and_replays() {
        let repos: Arc<dyn RepositoryProvider> = Arc::new(InMemoryRepositoryProvider::from_parts(
            Arc::new(InMemoryOccupancyStore::new()),
            Arc::new(SlowLedger {
                inner: InMemoryBalanceLedger::new(0),
                debit_delay: Duration::from_millis(100),
            }),
            Arc::new(InMemoryReconciliationLog::new()),
        ));
        let (service, repos) = service_over(repos, 10000, policy()).await;
        let token = r#"{"lotId": "1", "nonce": "n-5"}"#;

        let dropped = tokio::time::timeout(
            Duration::from_millis(20),
            service.process_entry(&Caller::user("u1"), token),
        )
        .await;
        assert!(dropped.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let retry = service.process_entry(&Caller::user("u1"), token).await.unwrap();
        assert!(retry.replayed);
        assert_eq!(retry.new_balance, 8000);
        assert_eq!(repos.ledger().get_balance("u1").await.unwrap(), 8000);
    }

    #[tokio::test]
    async fn stale_in_flight_marker_expires() {
        let mut p = policy();
        p.dedupe_window = Duration::from_millis(10);
        let (service, repos) = service_with_balance(10000, p).await;
        service.scans.insert(
            ("u1".to_string(), "n-6".to_string()),
            ScanState::InFlight { since: Instant::now() },
        );
        tokio::time::sleep(Duration::from_millis(30)).await;

        let receipt = service
            .process_entry(&Caller::user("u1"), r#"{"lotId": "1", "nonce": "n-6"}"#)
            .await
            .unwrap();
        assert!(!receipt.replayed);
        assert_eq!(repos.ledger().get_balance("u1").await.unwrap(), 8000);
    }

    #[tokio::test]
    async fn tokens_without_nonce_charge_every_time() {
        let (service, repos) = service_with_balance(10000, policy()).await;
        service.process_entry(&Caller::user("u1"), r#"{"lotId": 1}"#).await.unwrap();
        service.process_entry(&Caller::user("u1"), r#"{"lotId": 1}"#).await.unwrap();
        assert_eq!(repos.ledger().get_balance("u1").await.unwrap(), 6000);
    }

    #[tokio::test]
    async fn failed_charge_frees_the_nonce() {
        let (service, repos) = service_with_balance(1000, policy()).await;
        let token = r#"{"lotId": "1", "nonce": "n-3"}"#;
        assert!(service.process_entry(&Caller::user("u1"), token).await.is_err());

        repos
            .ledger()
            .credit(&CreditRequest {
                user_id: "u1".into(),
                amount: 4000,
                description: "top-up".into(),
                reference: LedgerReference::default(),
            })
            .await
            .unwrap();
        let receipt = service.process_entry(&Caller::user("u1"), token).await.unwrap();
        assert!(!receipt.replayed);
        assert_eq!(receipt.new_balance, 3000);
    }

    #[tokio::test]
    async fn expired_nonce_charges_again() {
        let mut p = policy();
        p.dedupe_window = Duration::from_millis(0);
        let (service, repos) = service_with_balance(10000, p).await;
        let token = r#"{"lotId": "1", "nonce": "n-4"}"#;
        service.process_entry(&Caller::user("u1"), token).await.unwrap();
        service.process_entry(&Caller::user("u1"), token).await.unwrap();
        assert_eq!(repos.ledger().get_balance("u1").await.unwrap(), 6000);
    }

    #[tokio::test]
    async fn issued_token_is_accepted() {
        let (service, _) = service_with_balance(5000, policy()).await;
        let token = service.issue_token("1").await.unwrap();
        assert_eq!(token.name.as_deref(), Some("City Center Lot"));
        let receipt = service
            .process_entry(&Caller::user("u1"), &token.encode())
            .await
            .unwrap();
        assert_eq!(receipt.facility_name, "City Center Lot");

        assert!(matches!(
            service.issue_token("nope").await,
            Err(DomainError::NotFound { .. })
        ));
    }
}
