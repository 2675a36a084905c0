pub mod admissions;
pub mod audit_log;
pub mod batches;
pub mod core;
pub mod fees;
pub mod ledger;
pub mod sessions;
pub mod students;
