//! Create slots table
//!
//! One row per bookable bay. The booking columns are only ever changed by a
//! conditional UPDATE on `is_booked`, together with the facility counter.

use sea_orm_migration::prelude::*;

use super::m20250601_000001_create_facilities::Facilities;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Slots::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Slots::FacilityId).string().not_null())
                    .col(ColumnDef::new(Slots::Id).string().not_null())
                    .col(
                        ColumnDef::new(Slots::Position)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Slots::Number).string().not_null())
                    .col(ColumnDef::new(Slots::Rate).big_integer().not_null())
                    .col(
                        ColumnDef::new(Slots::IsBooked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Slots::BookedBy).string())
                    .col(ColumnDef::new(Slots::BookedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Slots::SensorKey).string())
                    .primary_key(
                        Index::create()
                            .col(Slots::FacilityId)
                            .col(Slots::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_slots_facility")
                            .from(Slots::Table, Slots::FacilityId)
                            .to(Facilities::Table, Facilities::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_slots_booked_by")
                    .table(Slots::Table)
                    .col(Slots::BookedBy)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Slots::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Slots {
    Table,
    FacilityId,
    Id,
    Position,
    Number,
    Rate,
    IsBooked,
    BookedBy,
    BookedAt,
    SensorKey,
}
