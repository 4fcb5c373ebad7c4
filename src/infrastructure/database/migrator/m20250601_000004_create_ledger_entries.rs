//! Create ledger_entries table
//!
//! Append-only; every balance change writes exactly one row in the same
//! transaction.

use sea_orm_migration::prelude::*;

use super::m20250601_000003_create_user_accounts::UserAccounts;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LedgerEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LedgerEntries::Seq)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(LedgerEntries::EntryId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(LedgerEntries::UserId).string().not_null())
                    .col(ColumnDef::new(LedgerEntries::Amount).big_integer().not_null())
                    .col(ColumnDef::new(LedgerEntries::Description).string().not_null())
                    .col(ColumnDef::new(LedgerEntries::FacilityId).string())
                    .col(ColumnDef::new(LedgerEntries::SlotId).string())
                    .col(
                        ColumnDef::new(LedgerEntries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ledger_entries_user")
                            .from(LedgerEntries::Table, LedgerEntries::UserId)
                            .to(UserAccounts::Table, UserAccounts::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ledger_entries_user")
                    .table(LedgerEntries::Table)
                    .col(LedgerEntries::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LedgerEntries::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum LedgerEntries {
    Table,
    Seq,
    EntryId,
    UserId,
    Amount,
    Description,
    FacilityId,
    SlotId,
    CreatedAt,
}
