pub mod model;
pub mod repository;

pub use model::ReconciliationRecord;
pub use repository::ReconciliationLog;
