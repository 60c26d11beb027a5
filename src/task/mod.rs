//! Task module - task definitions, task-file loading and run records.
//!
//! This module is designed with exhaustive checking in mind:
//! - Terminal states are algebraic data types with exhaustive matching
//! - Invariants are documented and enforced where values are built
//! - Loading (IO) is separated from validation (pure)

mod definition;
mod loader;
mod outcome;

pub use definition::{ProviderKind, RoleSpec, Stage, TaskDefinition};
pub use loader::{TaskConfigError, TaskFile, TaskFileError};
pub use outcome::{Attempt, CancelReason, RunOutcome, TerminalStatus};
