//! Database repository implementations
//!
//! Per-store SeaORM repositories + unified RepositoryProvider.

pub mod ledger_repository;
pub mod occupancy_repository;
pub mod reconciliation_repository;
pub mod repository_provider;

pub use repository_provider::SeaOrmRepositoryProvider;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use std::path::PathBuf;
    use std::time::Duration;

    use sea_orm::sea_query::Expr;
    use sea_orm::{ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, QueryFilter};
    use sea_orm_migration::MigratorTrait;
    use tokio::sync::Barrier;

    use super::*;
    use crate::domain::account::{CreditRequest, DebitRequest, Identity, LedgerReference, ProfileUpdate};
    use crate::domain::facility::{Facility, Slot};
    use crate::domain::{DomainError, ReconciliationRecord, RepositoryProvider};
    use crate::infrastructure::database::entities::user_account;
    use crate::infrastructure::database::migrator::Migrator;
    use crate::infrastructure::database::{init_database, DatabaseConfig};
    use crate::infrastructure::seed::seed_if_empty;
    use crate::support::retry::{retry_with_backoff, RetryConfig};

    async fn connect() -> DatabaseConnection {
        // One connection: every pooled connection to `sqlite::memory:` is
        // its own database.
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(options).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn seeded(floor: i64) -> SeaOrmRepositoryProvider {
        let repos = SeaOrmRepositoryProvider::new(connect().await, floor);
        seed_if_empty(repos.occupancy(), 3).await.unwrap();
        repos
    }

    /// Database file shared by a pool of several connections, removed on drop.
    struct PooledFile {
        path: PathBuf,
        repos: Arc<SeaOrmRepositoryProvider>,
    }

    impl Drop for PooledFile {
        fn drop(&mut self) {
            for suffix in ["", "-wal", "-shm", "-journal"] {
                let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
            }
        }
    }

    async fn pooled_file(floor: i64) -> PooledFile {
        let path = std::env::temp_dir().join(format!("parking-{}.db", uuid::Uuid::new_v4()));
        let db = init_database(&DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            max_connections: 4,
        })
        .await
        .unwrap();
        Migrator::up(&db, None).await.unwrap();
        let repos = Arc::new(SeaOrmRepositoryProvider::new(db, floor));
        seed_if_empty(repos.occupancy(), 3).await.unwrap();
        PooledFile { path, repos }
    }

    fn patient() -> RetryConfig {
        RetryConfig {
            max_attempts: 50,
            initial_delay: Duration::from_millis(2),
            backoff_multiplier: 1.5,
            max_delay: Duration::from_millis(50),
        }
    }

    async fn funded(repos: &SeaOrmRepositoryProvider, user: &str, amount: i64) {
        repos.ledger().ensure_account(&Identity::new(user)).await.unwrap();
        repos
            .ledger()
            .credit(&CreditRequest {
                user_id: user.into(),
                amount,
                description: "Wallet top-up".into(),
                reference: LedgerReference::default(),
            })
            .await
            .unwrap();
    }

    fn debit(user: &str, amount: i64, required: Option<i64>) -> DebitRequest {
        DebitRequest {
            user_id: user.into(),
            amount,
            description: "Booking".into(),
            reference: LedgerReference::slot("1", "S1"),
            required_balance: required,
        }
    }

    #[tokio::test]
    async fn book_and_release_move_counter_and_revision() {
        let repos = seeded(0).await;
        let store = repos.occupancy();

        let booked = store.try_book("1", "S1", "alice").await.unwrap();
        assert!(booked.slot.is_booked);
        assert_eq!(booked.slot.booked_by.as_deref(), Some("alice"));
        assert_eq!(booked.facility.available_slots, 2);
        assert_eq!(booked.facility.revision, 1);

        let snapshot = store.snapshot("1").await.unwrap();
        assert!(snapshot.is_consistent());
        let ids: Vec<_> = snapshot.slots.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S2", "S3"]);

        let released = store.release("1", "S1", "alice").await.unwrap();
        assert!(!released.slot.is_booked);
        assert!(released.slot.booked_by.is_none());
        assert_eq!(released.facility.available_slots, 3);
        assert_eq!(released.facility.revision, 2);
    }

    #[tokio::test]
    async fn double_book_and_bad_release_are_typed() {
        let repos = seeded(0).await;
        let store = repos.occupancy();
        store.try_book("1", "S1", "alice").await.unwrap();

        assert!(matches!(
            store.try_book("1", "S1", "bob").await,
            Err(DomainError::AlreadyBooked { .. })
        ));
        assert!(matches!(
            store.release("1", "S1", "bob").await,
            Err(DomainError::NotHolder { .. })
        ));
        assert!(matches!(
            store.release("1", "S2", "alice").await,
            Err(DomainError::NotBooked { .. })
        ));
        assert!(matches!(
            store.try_book("1", "S9", "alice").await,
            Err(DomainError::NotFound { entity: "Slot", .. })
        ));
        assert!(matches!(
            store.try_book("99", "S1", "alice").await,
            Err(DomainError::NotFound { entity: "Facility", .. })
        ));

        let facility = store.find_facility("1").await.unwrap().unwrap();
        assert_eq!(facility.available_slots, 2);
        assert_eq!(facility.revision, 1);
    }

    #[tokio::test]
    async fn provisioning_rejects_duplicates() {
        let repos = seeded(0).await;
        let store = repos.occupancy();
        let facility = Facility::new("1", "Again", 1000, 1, None);
        let slots = vec![Slot::vacant("1", "S1", "Z-01", 1000)];
        assert!(matches!(
            store.provision_facility(facility, slots).await,
            Err(DomainError::Validation(_))
        ));

        let facility = Facility::new("6", "Dup slots", 1000, 2, None);
        let slots = vec![
            Slot::vacant("6", "S1", "F-01", 1000),
            Slot::vacant("6", "S1", "F-02", 1000),
        ];
        assert!(store.provision_facility(facility, slots).await.is_err());
        assert_eq!(store.list_facilities().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn debit_honours_threshold_then_floor() {
        let repos = seeded(0).await;
        funded(&repos, "u1", 1500).await;
        let ledger = repos.ledger();

        assert!(matches!(
            ledger.debit(&debit("u1", 1000, Some(2000))).await,
            Err(DomainError::InsufficientBalance { balance: 1500, minimum: 2000 })
        ));
        assert!(matches!(
            ledger.debit(&debit("u1", 2000, None)).await,
            Err(DomainError::InsufficientFunds { .. })
        ));

        let receipt = ledger.debit(&debit("u1", 1500, None)).await.unwrap();
        assert_eq!(receipt.new_balance, 0);
        assert_eq!(receipt.entry.amount, -1500);

        let history = ledger.list_transactions("u1", None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].is_debit());
        assert_eq!(history[0].reference, LedgerReference::slot("1", "S1"));
        assert_eq!(ledger.list_transactions("u1", Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_debits_never_overdraw() {
        let repos = Arc::new(seeded(0).await);
        funded(&repos, "u1", 5000).await;

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let repos = repos.clone();
                tokio::spawn(async move { repos.ledger().debit(&debit("u1", 1000, None)).await })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 5);
        assert_eq!(repos.ledger().get_balance("u1").await.unwrap(), 0);
        assert_eq!(repos.ledger().list_transactions("u1", None).await.unwrap().len(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pooled_connections_race_for_one_slot() {
        let file = pooled_file(0).await;
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = ["alice", "bob"]
            .into_iter()
            .map(|user| {
                let repos = file.repos.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    retry_with_backoff(
                        &patient(),
                        || repos.occupancy().try_book("1", "S1", user),
                        DomainError::is_transient,
                        "slot_race",
                    )
                    .await
                })
            })
            .collect();

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(commit) => winners.push(commit.slot.booked_by.unwrap()),
                Err(DomainError::AlreadyBooked { .. }) => {}
                Err(e) => panic!("unexpected {e}"),
            }
        }
        assert_eq!(winners.len(), 1);

        let snapshot = file.repos.occupancy().snapshot("1").await.unwrap();
        assert!(snapshot.is_consistent());
        assert_eq!(snapshot.facility.available_slots, 2);
        assert_eq!(snapshot.facility.revision, 1);
        assert_eq!(snapshot.slots[0].booked_by.as_deref(), Some(winners[0].as_str()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pooled_connections_never_debit_past_floor() {
        let file = pooled_file(500).await;
        funded(&file.repos, "u1", 3500).await;
        let barrier = Arc::new(Barrier::new(6));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let repos = file.repos.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    let request = debit("u1", 1000, None);
                    retry_with_backoff(
                        &patient(),
                        || repos.ledger().debit(&request),
                        DomainError::is_transient,
                        "debit_race",
                    )
                    .await
                })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(receipt) => {
                    assert!(receipt.new_balance >= 500);
                    applied += 1;
                }
                Err(DomainError::InsufficientFunds { .. }) => {}
                Err(e) => panic!("unexpected {e}"),
            }
        }
        assert_eq!(applied, 3);
        assert_eq!(file.repos.ledger().get_balance("u1").await.unwrap(), 500);
        assert_eq!(file.repos.ledger().list_transactions("u1", None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn corrupt_vehicle_column_is_a_storage_error() {
        let db = connect().await;
        let repos = SeaOrmRepositoryProvider::new(db.clone(), 0);
        repos.ledger().ensure_account(&Identity::new("u1")).await.unwrap();

        user_account::Entity::update_many()
            .col_expr(user_account::Column::Vehicles, Expr::value("[\"DL 3C"))
            .filter(user_account::Column::Id.eq("u1"))
            .exec(&db)
            .await
            .unwrap();

        assert!(matches!(
            repos.ledger().get_account("u1").await,
            Err(DomainError::Storage(_))
        ));
        assert!(matches!(
            repos.ledger().ensure_account(&Identity::new("u1")).await,
            Err(DomainError::Storage(_))
        ));
        // Balance reads do not touch the column.
        assert_eq!(repos.ledger().get_balance("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn floor_near_i64_max_rejects_without_overflow() {
        let repos = seeded(i64::MAX - 100).await;
        funded(&repos, "u1", 5000).await;
        assert!(matches!(
            repos.ledger().debit(&debit("u1", 1000, None)).await,
            Err(DomainError::InsufficientFunds { .. })
        ));
        assert_eq!(repos.ledger().get_balance("u1").await.unwrap(), 5000);
    }

    #[tokio::test]
    async fn accounts_are_created_once_and_profile_is_normalized() {
        let repos = seeded(0).await;
        let ledger = repos.ledger();
        let identity = Identity {
            user_id: "u1".into(),
            display_name: Some("Asha".into()),
            email: Some("asha@example.com".into()),
        };

        let first = ledger.ensure_account(&identity).await.unwrap();
        assert_eq!(first.balance, 0);
        funded(&repos, "u1", 700).await;
        let again = ledger.ensure_account(&identity).await.unwrap();
        assert_eq!(again.balance, 700);
        assert_eq!(again.display_name, "Asha");

        let updated = ledger
            .update_profile(
                "u1",
                &ProfileUpdate {
                    phone: Some("+91 98100 00000".into()),
                    vehicles: Some(vec!["dl 3c ab 1234".into(), "DL 3C AB 1234".into()]),
                    vehicle_type: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.vehicles, vec!["DL 3C AB 1234"]);
        assert_eq!(updated.balance, 700);

        assert!(matches!(
            ledger.get_balance("ghost").await,
            Err(DomainError::NotFound { .. })
        ));
        assert!(matches!(
            ledger.list_transactions("ghost", None).await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn reconciliation_records_persist() {
        let repos = seeded(0).await;
        let record = ReconciliationRecord::new("u1", "1", "S1", 3000, "entry-1", "store down", "ledger down");
        repos.reconciliation().record(&record).await.unwrap();

        let records = repos.reconciliation().list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, record.id);
        assert_eq!(records[0].debit_entry_id, "entry-1");
        assert_eq!(records[0].amount, 3000);
    }
}
