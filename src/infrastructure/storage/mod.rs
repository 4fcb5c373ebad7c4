//! In-memory store implementations

mod memory;

pub(crate) use memory::prepare_provision;
pub use memory::{
    InMemoryBalanceLedger, InMemoryOccupancyStore, InMemoryReconciliationLog,
    InMemoryRepositoryProvider,
};
