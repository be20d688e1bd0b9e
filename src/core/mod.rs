//! Core types and functionality for Stackrun.
//!
//! This module contains the building blocks every operation uses:
//! configuration, tool resolution, command invocations and execution.

mod config;
mod error;
mod executor;
mod invocation;
mod tool;

pub use config::{
    default_for, read_dotenv, Config, DotenvConfig, Settings, ValueSource, Variable,
    CONFIG_FILE_NAME, VARIABLES,
};
pub use error::{OrchestratorError, Result, EXIT_FAILURE, EXIT_PRECONDITION};
pub use executor::{ExecutionResult, Executor};
pub use invocation::Invocation;
pub use tool::{Candidate, ResolvedTool, ToolKind, ToolResolver};
