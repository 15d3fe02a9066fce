pub mod config;
pub mod error;
pub mod execution;
pub mod traits;
pub mod types;
pub mod workflow;

pub use config::AppConfig;
pub use error::{Result, WeftError};
pub use execution::*;
pub use types::*;
pub use workflow::*;
