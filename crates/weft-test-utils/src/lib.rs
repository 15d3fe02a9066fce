//! Mocks and fixtures shared by Weft's test suites.

pub mod fixtures;
pub mod http;
pub mod llm;
pub mod store;
pub mod tools;

pub use fixtures::*;
pub use llm::MockLlmClient;
pub use store::MemoryStore;
pub use tools::{FailingTool, MockTool, SlowTool};
