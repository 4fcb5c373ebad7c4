//! Database entities module

pub mod facility;
pub mod ledger_entry;
pub mod reconciliation_record;
pub mod slot;
pub mod user_account;

pub use facility::Entity as Facility;
pub use ledger_entry::Entity as LedgerEntry;
pub use reconciliation_record::Entity as ReconciliationRecord;
pub use slot::Entity as Slot;
pub use user_account::Entity as UserAccount;
