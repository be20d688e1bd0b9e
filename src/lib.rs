//! # Stackrun
//!
//! Run the local build, stack, chart and docs workflows of a project through
//! one CLI.
//!
//! Stackrun does not reimplement any of the tools it drives. Each operation
//! resolves its configuration from the environment (with fixed defaults),
//! locates the external tool by probing a fixed preference list, composes one
//! command line and runs it, propagating the tool's exit status.
//!
//! ## Quick Start
//!
//! ```bash
//! # Build the image tagged with the current commit
//! stackrun build-image
//!
//! # Start the local stack, then package the chart
//! stackrun up
//! stackrun chart-package
//!
//! # Show what would run without running it
//! stackrun --dry-run docs-deploy
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::redundant_else)]
#![allow(clippy::if_not_else)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::unnecessary_literal_bound)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::redundant_clone)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::unnecessary_map_or)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unreadable_literal)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::unnecessary_debug_formatting)]
#![allow(clippy::for_kv_map)]
#![allow(clippy::use_self)]
#![allow(clippy::ptr_arg)]

pub mod chart;
pub mod core;
pub mod git;
pub mod orchestrator;

// Re-export commonly used types
pub use self::core::{Config, Executor, OrchestratorError, Settings, ToolKind, ToolResolver};
pub use orchestrator::{Operation, Orchestrator, Outcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "stackrun";
