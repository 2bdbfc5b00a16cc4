//! Per-request approval chains.
//!
//! Steps only record their own state. Advancing to the next step, and halting after a
//! rejection, is decided by the commands in [`crate::commands`].

mod actor;
mod chain;
mod step;

pub use actor::Actor;
pub use chain::Workflow;
pub use step::{StepState, WorkflowStep};
