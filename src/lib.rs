pub mod authz;
pub mod commands;
pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod workflow;

// Re-export commonly used items for tests
pub use commands::{ResourceRequest, StepCommands, StepTransition};
pub use config::AuthzConfig;
pub use errors::{AppError, AppResult};
