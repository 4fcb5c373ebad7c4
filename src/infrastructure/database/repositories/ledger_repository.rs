//! SeaORM implementation of BalanceLedger

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::debug;

use crate::domain::account::{
    check_debit, validate_amount, BalanceLedger, CreditRequest, DebitRequest, Identity,
    LedgerEntry, LedgerReceipt, LedgerReference, ProfileUpdate, UserAccount,
};
use crate::domain::{DomainError, DomainResult};
use crate::infrastructure::database::entities::{ledger_entry, user_account};
use crate::support::errors::map_db_err;

pub struct SeaOrmLedgerRepository {
    db: DatabaseConnection,
    floor: i64,
}

impl SeaOrmLedgerRepository {
    pub fn new(db: DatabaseConnection, floor: i64) -> Self {
        Self { db, floor }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn account_to_domain(m: user_account::Model) -> DomainResult<UserAccount> {
    let vehicles = serde_json::from_str(&m.vehicles).map_err(|e| {
        DomainError::Storage(format!("corrupt vehicles column for account {}: {}", m.id, e))
    })?;
    Ok(UserAccount {
        id: m.id,
        display_name: m.display_name,
        email: m.email,
        phone: m.phone,
        vehicles,
        vehicle_type: m.vehicle_type,
        balance: m.balance,
        created_at: m.created_at,
        last_login_at: m.last_login_at,
    })
}

fn entry_to_domain(m: ledger_entry::Model) -> LedgerEntry {
    LedgerEntry {
        id: m.entry_id,
        user_id: m.user_id,
        amount: m.amount,
        description: m.description,
        reference: LedgerReference {
            facility_id: m.facility_id,
            slot_id: m.slot_id,
        },
        created_at: m.created_at,
    }
}

fn account_not_found(user_id: &str) -> DomainError {
    DomainError::NotFound {
        entity: "UserAccount",
        field: "id",
        value: user_id.to_string(),
    }
}

async fn load_account<C: ConnectionTrait>(conn: &C, user_id: &str) -> DomainResult<Option<user_account::Model>> {
    user_account::Entity::find_by_id(user_id.to_string())
        .one(conn)
        .await
        .map_err(map_db_err)
}

async fn append_entry<C: ConnectionTrait>(conn: &C, entry: &LedgerEntry) -> DomainResult<()> {
    ledger_entry::ActiveModel {
        entry_id: Set(entry.id.clone()),
        user_id: Set(entry.user_id.clone()),
        amount: Set(entry.amount),
        description: Set(entry.description.clone()),
        facility_id: Set(entry.reference.facility_id.clone()),
        slot_id: Set(entry.reference.slot_id.clone()),
        created_at: Set(entry.created_at),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

fn vehicles_json(vehicles: &[String]) -> String {
    serde_json::to_string(vehicles).unwrap_or_else(|_| "[]".to_string())
}

// ── BalanceLedger impl ──────────────────────────────────────────

#[async_trait]
impl BalanceLedger for SeaOrmLedgerRepository {
    async fn ensure_account(&self, identity: &Identity) -> DomainResult<UserAccount> {
        if identity.user_id.trim().is_empty() {
            return Err(DomainError::Unauthenticated);
        }
        let now = Utc::now();

        let touched = user_account::Entity::update_many()
            .col_expr(user_account::Column::LastLoginAt, Expr::value(now))
            .filter(user_account::Column::Id.eq(identity.user_id.as_str()))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        if touched.rows_affected == 0 {
            let fresh = UserAccount::from_identity(identity);
            debug!(user_id = %fresh.id, "Creating account");
            let model = user_account::ActiveModel {
                id: Set(fresh.id.clone()),
                display_name: Set(fresh.display_name.clone()),
                email: Set(fresh.email.clone()),
                phone: Set(fresh.phone.clone()),
                vehicles: Set(vehicles_json(&fresh.vehicles)),
                vehicle_type: Set(fresh.vehicle_type.clone()),
                balance: Set(0),
                created_at: Set(fresh.created_at),
                last_login_at: Set(fresh.last_login_at),
            };
            // A concurrent first login may have inserted the row already.
            user_account::Entity::insert(model)
                .on_conflict(
                    OnConflict::column(user_account::Column::Id)
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(&self.db)
                .await
                .map_err(map_db_err)?;
        }

        load_account(&self.db, &identity.user_id)
            .await?
            .map(account_to_domain)
            .transpose()?
            .ok_or_else(|| account_not_found(&identity.user_id))
    }

    async fn get_account(&self, user_id: &str) -> DomainResult<Option<UserAccount>> {
        load_account(&self.db, user_id)
            .await?
            .map(account_to_domain)
            .transpose()
    }

    async fn get_balance(&self, user_id: &str) -> DomainResult<i64> {
        load_account(&self.db, user_id)
            .await?
            .map(|m| m.balance)
            .ok_or_else(|| account_not_found(user_id))
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> DomainResult<UserAccount> {
        let existing = load_account(&self.db, user_id)
            .await?
            .ok_or_else(|| account_not_found(user_id))?;

        let mut account = account_to_domain(existing.clone())?;
        account.apply_profile(update);

        let mut active: user_account::ActiveModel = existing.into();
        active.phone = Set(account.phone.clone());
        active.vehicles = Set(vehicles_json(&account.vehicles));
        active.vehicle_type = Set(account.vehicle_type.clone());
        let saved = active.update(&self.db).await.map_err(map_db_err)?;
        account_to_domain(saved)
    }

    async fn debit(&self, request: &DebitRequest) -> DomainResult<LedgerReceipt> {
        validate_amount(request.amount)?;
        let txn = self.db.begin().await.map_err(map_db_err)?;

        let balance = load_account(&txn, &request.user_id)
            .await?
            .ok_or_else(|| account_not_found(&request.user_id))?
            .balance;
        check_debit(balance, request, self.floor)?;

        // The guard repeats the check inside the write, so a concurrent
        // debit between the read above and this update cannot overdraw.
        let floor_threshold = request.amount.checked_add(self.floor).ok_or_else(|| {
            DomainError::Validation(format!("debit of {} overflows the balance range", request.amount))
        })?;
        let threshold = request.required_balance.unwrap_or(i64::MIN).max(floor_threshold);
        let applied = user_account::Entity::update_many()
            .col_expr(
                user_account::Column::Balance,
                Expr::col(user_account::Column::Balance).sub(request.amount),
            )
            .filter(user_account::Column::Id.eq(request.user_id.as_str()))
            .filter(user_account::Column::Balance.gte(threshold))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;

        if applied.rows_affected == 0 {
            let current = load_account(&txn, &request.user_id)
                .await?
                .map(|m| m.balance)
                .unwrap_or(balance);
            txn.rollback().await.map_err(map_db_err)?;
            check_debit(current, request, self.floor)?;
            return Err(DomainError::Conflict(format!(
                "balance of {} changed during debit",
                request.user_id
            )));
        }

        let entry = LedgerEntry::new(
            &request.user_id,
            -request.amount,
            request.description.clone(),
            request.reference.clone(),
        );
        append_entry(&txn, &entry).await?;

        let new_balance = load_account(&txn, &request.user_id)
            .await?
            .map(|m| m.balance)
            .ok_or_else(|| account_not_found(&request.user_id))?;
        txn.commit().await.map_err(map_db_err)?;

        debug!(user_id = %request.user_id, amount = request.amount, new_balance, "Debited");
        Ok(LedgerReceipt { entry, new_balance })
    }

    async fn credit(&self, request: &CreditRequest) -> DomainResult<LedgerReceipt> {
        validate_amount(request.amount)?;
        let txn = self.db.begin().await.map_err(map_db_err)?;

        let applied = user_account::Entity::update_many()
            .col_expr(
                user_account::Column::Balance,
                Expr::col(user_account::Column::Balance).add(request.amount),
            )
            .filter(user_account::Column::Id.eq(request.user_id.as_str()))
            .filter(user_account::Column::Balance.lte(i64::MAX - request.amount))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;

        if applied.rows_affected == 0 {
            let exists = load_account(&txn, &request.user_id).await?.is_some();
            txn.rollback().await.map_err(map_db_err)?;
            return Err(if exists {
                DomainError::Validation("balance overflow".into())
            } else {
                account_not_found(&request.user_id)
            });
        }

        let entry = LedgerEntry::new(
            &request.user_id,
            request.amount,
            request.description.clone(),
            request.reference.clone(),
        );
        append_entry(&txn, &entry).await?;

        let new_balance = load_account(&txn, &request.user_id)
            .await?
            .map(|m| m.balance)
            .ok_or_else(|| account_not_found(&request.user_id))?;
        txn.commit().await.map_err(map_db_err)?;

        debug!(user_id = %request.user_id, amount = request.amount, new_balance, "Credited");
        Ok(LedgerReceipt { entry, new_balance })
    }

    async fn list_transactions(&self, user_id: &str, limit: Option<u64>) -> DomainResult<Vec<LedgerEntry>> {
        if load_account(&self.db, user_id).await?.is_none() {
            return Err(account_not_found(user_id));
        }

        let mut query = ledger_entry::Entity::find()
            .filter(ledger_entry::Column::UserId.eq(user_id))
            .order_by_desc(ledger_entry::Column::Seq);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        let models = query.all(&self.db).await.map_err(map_db_err)?;
        Ok(models.into_iter().map(entry_to_domain).collect())
    }
}
