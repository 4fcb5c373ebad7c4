//! Account aggregate
//!
//! User accounts, their ledger entries, and the balance ledger interface.

pub mod model;
pub mod repository;

pub use model::{
    check_debit, normalize_plates, validate_amount, CreditRequest, DebitRequest, Identity,
    LedgerEntry, LedgerReceipt, LedgerReference, ProfileUpdate, UserAccount,
};
pub use repository::BalanceLedger;
