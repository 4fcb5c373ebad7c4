//! Database migrations module

pub use sea_orm_migration::prelude::*;

mod m20250601_000001_create_facilities;
mod m20250601_000002_create_slots;
mod m20250601_000003_create_user_accounts;
mod m20250601_000004_create_ledger_entries;
mod m20250601_000005_create_reconciliation_records;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_facilities::Migration),
            Box::new(m20250601_000002_create_slots::Migration),
            Box::new(m20250601_000003_create_user_accounts::Migration),
            Box::new(m20250601_000004_create_ledger_entries::Migration),
            Box::new(m20250601_000005_create_reconciliation_records::Migration),
        ]
    }
}
