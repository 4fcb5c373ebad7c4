//! SeaORM implementation of OccupancyStore

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tracing::debug;

use crate::domain::facility::{Facility, FacilitySnapshot, OccupancyStore, Slot, SlotCommit};
use crate::domain::geo::Coordinate;
use crate::domain::{DomainError, DomainResult};
use crate::infrastructure::database::entities::{facility, slot};
use crate::infrastructure::storage::prepare_provision;
use crate::support::errors::map_db_err;

pub struct SeaOrmOccupancyRepository {
    db: DatabaseConnection,
}

impl SeaOrmOccupancyRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn facility_to_domain(m: facility::Model) -> Facility {
    let location = match (m.latitude, m.longitude) {
        (Some(lat), Some(lng)) => Some(Coordinate::new(lat, lng)),
        _ => None,
    };
    Facility {
        id: m.id,
        name: m.name,
        base_rate: m.base_rate,
        capacity: m.capacity.max(0) as u32,
        available_slots: m.available_slots.max(0) as u32,
        location,
        revision: m.revision.max(0) as u64,
        created_at: m.created_at,
    }
}

fn slot_to_domain(m: slot::Model) -> Slot {
    Slot {
        facility_id: m.facility_id,
        id: m.id,
        number: m.number,
        rate: m.rate,
        is_booked: m.is_booked,
        booked_by: m.booked_by,
        booked_at: m.booked_at,
        sensor_key: m.sensor_key,
    }
}

fn facility_not_found(facility_id: &str) -> DomainError {
    DomainError::NotFound {
        entity: "Facility",
        field: "id",
        value: facility_id.to_string(),
    }
}

fn slot_not_found(facility_id: &str, slot_id: &str) -> DomainError {
    DomainError::NotFound {
        entity: "Slot",
        field: "id",
        value: format!("{}/{}", facility_id, slot_id),
    }
}

async fn load_facility<C: ConnectionTrait>(conn: &C, facility_id: &str) -> DomainResult<Option<facility::Model>> {
    facility::Entity::find_by_id(facility_id.to_string())
        .one(conn)
        .await
        .map_err(map_db_err)
}

async fn load_slot<C: ConnectionTrait>(
    conn: &C,
    facility_id: &str,
    slot_id: &str,
) -> DomainResult<Option<slot::Model>> {
    slot::Entity::find_by_id((facility_id.to_string(), slot_id.to_string()))
        .one(conn)
        .await
        .map_err(map_db_err)
}

/// Re-read the committed rows of a transition inside its transaction.
async fn read_commit<C: ConnectionTrait>(conn: &C, facility_id: &str, slot_id: &str) -> DomainResult<SlotCommit> {
    let facility = load_facility(conn, facility_id)
        .await?
        .ok_or_else(|| facility_not_found(facility_id))?;
    let slot = load_slot(conn, facility_id, slot_id)
        .await?
        .ok_or_else(|| slot_not_found(facility_id, slot_id))?;
    Ok(SlotCommit {
        slot: slot_to_domain(slot),
        facility: facility_to_domain(facility),
    })
}

/// Move one slot in or out of the facility counter and bump its revision.
/// Fails when the counter would leave `0..=capacity`.
async fn adjust_counter<C: ConnectionTrait>(conn: &C, facility_id: &str, vacated: bool) -> DomainResult<()> {
    let update = facility::Entity::update_many()
        .col_expr(facility::Column::Revision, Expr::col(facility::Column::Revision).add(1))
        .filter(facility::Column::Id.eq(facility_id));
    let update = if vacated {
        update
            .col_expr(
                facility::Column::AvailableSlots,
                Expr::col(facility::Column::AvailableSlots).add(1),
            )
            .filter(Expr::col(facility::Column::AvailableSlots).lt(Expr::col(facility::Column::Capacity)))
    } else {
        update
            .col_expr(
                facility::Column::AvailableSlots,
                Expr::col(facility::Column::AvailableSlots).sub(1),
            )
            .filter(facility::Column::AvailableSlots.gt(0))
    };

    let result = update.exec(conn).await.map_err(map_db_err)?;
    if result.rows_affected == 0 {
        return Err(DomainError::Storage(format!(
            "available slot counter of facility {} out of range",
            facility_id
        )));
    }
    Ok(())
}

// ── OccupancyStore impl ─────────────────────────────────────────

#[async_trait]
impl OccupancyStore for SeaOrmOccupancyRepository {
    async fn provision_facility(&self, facility: Facility, slots: Vec<Slot>) -> DomainResult<Facility> {
        let (facility, slots) = prepare_provision(facility, slots)?;
        debug!(facility_id = %facility.id, slots = slots.len(), "Provisioning facility");

        let txn = self.db.begin().await.map_err(map_db_err)?;
        if load_facility(&txn, &facility.id).await?.is_some() {
            return Err(DomainError::Validation(format!(
                "facility {} already exists",
                facility.id
            )));
        }

        facility::ActiveModel {
            id: Set(facility.id.clone()),
            name: Set(facility.name.clone()),
            base_rate: Set(facility.base_rate),
            capacity: Set(facility.capacity as i32),
            available_slots: Set(facility.available_slots as i32),
            latitude: Set(facility.location.map(|c| c.latitude)),
            longitude: Set(facility.location.map(|c| c.longitude)),
            revision: Set(facility.revision as i64),
            created_at: Set(facility.created_at),
        }
        .insert(&txn)
        .await
        .map_err(map_db_err)?;

        for (position, s) in slots.into_iter().enumerate() {
            slot::ActiveModel {
                facility_id: Set(s.facility_id),
                id: Set(s.id),
                position: Set(position as i32),
                number: Set(s.number),
                rate: Set(s.rate),
                is_booked: Set(s.is_booked),
                booked_by: Set(s.booked_by),
                booked_at: Set(s.booked_at),
                sensor_key: Set(s.sensor_key),
            }
            .insert(&txn)
            .await
            .map_err(map_db_err)?;
        }

        txn.commit().await.map_err(map_db_err)?;
        Ok(facility)
    }

    async fn list_facilities(&self) -> DomainResult<Vec<Facility>> {
        let models = facility::Entity::find()
            .order_by_asc(facility::Column::CreatedAt)
            .order_by_asc(facility::Column::Id)
            .all(&self.db)
            .await
            .map_err(map_db_err)?;
        Ok(models.into_iter().map(facility_to_domain).collect())
    }

    async fn find_facility(&self, facility_id: &str) -> DomainResult<Option<Facility>> {
        Ok(load_facility(&self.db, facility_id).await?.map(facility_to_domain))
    }

    async fn find_slot(&self, facility_id: &str, slot_id: &str) -> DomainResult<Option<Slot>> {
        Ok(load_slot(&self.db, facility_id, slot_id).await?.map(slot_to_domain))
    }

    async fn snapshot(&self, facility_id: &str) -> DomainResult<FacilitySnapshot> {
        let txn = self.db.begin().await.map_err(map_db_err)?;
        let facility = load_facility(&txn, facility_id)
            .await?
            .ok_or_else(|| facility_not_found(facility_id))?;
        let slots = slot::Entity::find()
            .filter(slot::Column::FacilityId.eq(facility_id))
            .order_by_asc(slot::Column::Position)
            .all(&txn)
            .await
            .map_err(map_db_err)?;
        txn.commit().await.map_err(map_db_err)?;

        Ok(FacilitySnapshot {
            facility: facility_to_domain(facility),
            slots: slots.into_iter().map(slot_to_domain).collect(),
        })
    }

    async fn try_book(&self, facility_id: &str, slot_id: &str, holder: &str) -> DomainResult<SlotCommit> {
        let txn = self.db.begin().await.map_err(map_db_err)?;

        let claimed = slot::Entity::update_many()
            .col_expr(slot::Column::IsBooked, Expr::value(true))
            .col_expr(slot::Column::BookedBy, Expr::value(holder.to_string()))
            .col_expr(slot::Column::BookedAt, Expr::value(Utc::now()))
            .filter(slot::Column::FacilityId.eq(facility_id))
            .filter(slot::Column::Id.eq(slot_id))
            .filter(slot::Column::IsBooked.eq(false))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;

        if claimed.rows_affected == 0 {
            let err = if load_facility(&txn, facility_id).await?.is_none() {
                facility_not_found(facility_id)
            } else if load_slot(&txn, facility_id, slot_id).await?.is_none() {
                slot_not_found(facility_id, slot_id)
            } else {
                DomainError::AlreadyBooked {
                    facility_id: facility_id.to_string(),
                    slot_id: slot_id.to_string(),
                }
            };
            txn.rollback().await.map_err(map_db_err)?;
            return Err(err);
        }

        adjust_counter(&txn, facility_id, false).await?;
        let commit = read_commit(&txn, facility_id, slot_id).await?;
        txn.commit().await.map_err(map_db_err)?;

        debug!(facility_id, slot_id, holder, revision = commit.facility.revision, "Slot claimed");
        Ok(commit)
    }

    async fn release(&self, facility_id: &str, slot_id: &str, holder: &str) -> DomainResult<SlotCommit> {
        let txn = self.db.begin().await.map_err(map_db_err)?;

        let released = slot::Entity::update_many()
            .col_expr(slot::Column::IsBooked, Expr::value(false))
            .col_expr(slot::Column::BookedBy, Expr::value(Option::<String>::None))
            .col_expr(
                slot::Column::BookedAt,
                Expr::value(Option::<chrono::DateTime<Utc>>::None),
            )
            .filter(slot::Column::FacilityId.eq(facility_id))
            .filter(slot::Column::Id.eq(slot_id))
            .filter(slot::Column::IsBooked.eq(true))
            .filter(slot::Column::BookedBy.eq(holder))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;

        if released.rows_affected == 0 {
            let err = match load_slot(&txn, facility_id, slot_id).await? {
                None => {
                    if load_facility(&txn, facility_id).await?.is_none() {
                        facility_not_found(facility_id)
                    } else {
                        slot_not_found(facility_id, slot_id)
                    }
                }
                Some(s) if !s.is_booked => DomainError::NotBooked {
                    facility_id: facility_id.to_string(),
                    slot_id: slot_id.to_string(),
                },
                Some(_) => DomainError::NotHolder {
                    facility_id: facility_id.to_string(),
                    slot_id: slot_id.to_string(),
                },
            };
            txn.rollback().await.map_err(map_db_err)?;
            return Err(err);
        }

        adjust_counter(&txn, facility_id, true).await?;
        let commit = read_commit(&txn, facility_id, slot_id).await?;
        txn.commit().await.map_err(map_db_err)?;

        debug!(facility_id, slot_id, holder, revision = commit.facility.revision, "Slot vacated");
        Ok(commit)
    }
}
