//! Create reconciliation_records table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReconciliationRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReconciliationRecords::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ReconciliationRecords::UserId).string().not_null())
                    .col(ColumnDef::new(ReconciliationRecords::FacilityId).string().not_null())
                    .col(ColumnDef::new(ReconciliationRecords::SlotId).string().not_null())
                    .col(ColumnDef::new(ReconciliationRecords::Amount).big_integer().not_null())
                    .col(ColumnDef::new(ReconciliationRecords::DebitEntryId).string().not_null())
                    .col(ColumnDef::new(ReconciliationRecords::BookingError).text().not_null())
                    .col(
                        ColumnDef::new(ReconciliationRecords::CompensationError)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReconciliationRecords::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum ReconciliationRecords {
    Table,
    Id,
    UserId,
    FacilityId,
    SlotId,
    Amount,
    DebitEntryId,
    BookingError,
    CompensationError,
    CreatedAt,
}
