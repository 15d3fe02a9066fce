pub mod executions;
pub mod store;
pub mod workflows;

pub use store::SqliteStore;
