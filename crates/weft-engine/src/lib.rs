pub mod engine;
pub mod expr;
pub mod ledger;
pub mod model;
pub mod service;
pub mod tools;
pub mod validate;

pub use engine::WorkflowEngine;
pub use ledger::ExecutionLedger;
pub use model::{estimate_cost, ModelInvoker};
pub use service::WorkflowService;
pub use tools::ToolInvoker;
pub use validate::validate;
