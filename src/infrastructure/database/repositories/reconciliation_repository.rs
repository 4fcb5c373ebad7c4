//! SeaORM implementation of ReconciliationLog

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use uuid::Uuid;

use crate::domain::reconciliation::{ReconciliationLog, ReconciliationRecord};
use crate::domain::DomainResult;
use crate::infrastructure::database::entities::reconciliation_record;
use crate::support::errors::map_db_err;

pub struct SeaOrmReconciliationRepository {
    db: DatabaseConnection,
}

impl SeaOrmReconciliationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_domain(m: reconciliation_record::Model) -> ReconciliationRecord {
    ReconciliationRecord {
        id: Uuid::parse_str(&m.id).unwrap_or_default(),
        user_id: m.user_id,
        facility_id: m.facility_id,
        slot_id: m.slot_id,
        amount: m.amount,
        debit_entry_id: m.debit_entry_id,
        booking_error: m.booking_error,
        compensation_error: m.compensation_error,
        created_at: m.created_at,
    }
}

#[async_trait]
impl ReconciliationLog for SeaOrmReconciliationRepository {
    async fn record(&self, record: &ReconciliationRecord) -> DomainResult<()> {
        reconciliation_record::ActiveModel {
            id: Set(record.id.to_string()),
            user_id: Set(record.user_id.clone()),
            facility_id: Set(record.facility_id.clone()),
            slot_id: Set(record.slot_id.clone()),
            amount: Set(record.amount),
            debit_entry_id: Set(record.debit_entry_id.clone()),
            booking_error: Set(record.booking_error.clone()),
            compensation_error: Set(record.compensation_error.clone()),
            created_at: Set(record.created_at),
        }
        .insert(&self.db)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<ReconciliationRecord>> {
        let models = reconciliation_record::Entity::find()
            .order_by_asc(reconciliation_record::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(map_db_err)?;
        Ok(models.into_iter().map(to_domain).collect())
    }
}
