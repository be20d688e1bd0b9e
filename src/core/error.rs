//! Error types for the orchestrator.
//!
//! Every failure is fatal. The variants fall into three classes that map to
//! process exit codes: preconditions that were not met, a delegated tool that
//! failed, and everything else.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Exit code used when a precondition (variable, tool, clean tree) is not met.
pub const EXIT_PRECONDITION: u8 = 3;

/// Exit code for failures that are neither preconditions nor tool failures.
pub const EXIT_FAILURE: u8 = 1;

/// Errors that can abort a run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A required configuration variable is unset or empty.
    #[error("Required variable '{name}' is not set: {hint}")]
    ConfigurationMissing { name: String, hint: String },

    /// None of the candidate executables for a tool could be found.
    #[error("Tool not found: {tool} (tried: {candidates})")]
    ToolNotFound { tool: String, candidates: String },

    /// The delegated tool exited unsuccessfully.
    #[error("{tool} exited with status {code}")]
    UpstreamToolFailure { tool: String, code: i32 },

    /// A cleanliness precondition failed.
    #[error("Workspace is not clean: {0}")]
    WorkspaceNotClean(String),

    /// The tool succeeded but the expected output was not produced.
    #[error("Expected artifact was not produced: {0}")]
    ArtifactMissing(PathBuf),

    /// Malformed configuration file or project metadata.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Git repository error.
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    /// Create a missing-variable error.
    pub fn missing(name: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::ConfigurationMissing { name: name.into(), hint: hint.into() }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error means a precondition was not met.
    ///
    /// Precondition failures are always raised before any external process
    /// is started.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationMissing { .. } | Self::ToolNotFound { .. } | Self::WorkspaceNotClean(_)
        )
    }

    /// Process exit code for this error.
    ///
    /// Tool failures propagate the tool's own code. Codes outside `1..=255`
    /// collapse to the generic failure code so a failure never exits 0.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::UpstreamToolFailure { code, .. } => {
                u8::try_from(*code).ok().filter(|c| *c != 0).unwrap_or(EXIT_FAILURE)
            }
            err if err.is_precondition() => EXIT_PRECONDITION,
            _ => EXIT_FAILURE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::missing("REVISION", "not inside a git repository");
        assert_eq!(
            err.to_string(),
            "Required variable 'REVISION' is not set: not inside a git repository"
        );

        let err = OrchestratorError::ToolNotFound {
            tool: "chart manager".to_string(),
            candidates: "helm".to_string(),
        };
        assert_eq!(err.to_string(), "Tool not found: chart manager (tried: helm)");
    }

    #[test]
    fn test_precondition_exit_code() {
        assert_eq!(OrchestratorError::missing("X", "unset").exit_code(), EXIT_PRECONDITION);
        assert_eq!(
            OrchestratorError::WorkspaceNotClean("2 changed paths".into()).exit_code(),
            EXIT_PRECONDITION
        );
        assert_eq!(
            OrchestratorError::ToolNotFound { tool: "t".into(), candidates: "a, b".into() }
                .exit_code(),
            EXIT_PRECONDITION
        );
    }

    #[test]
    fn test_upstream_exit_code_is_propagated() {
        let err = OrchestratorError::UpstreamToolFailure { tool: "helm".into(), code: 7 };
        assert_eq!(err.exit_code(), 7);
        assert!(!err.is_precondition());

        // Out-of-range codes never turn into success.
        let err = OrchestratorError::UpstreamToolFailure { tool: "helm".into(), code: 256 };
        assert_eq!(err.exit_code(), EXIT_FAILURE);
        let err = OrchestratorError::UpstreamToolFailure { tool: "helm".into(), code: -1 };
        assert_eq!(err.exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: OrchestratorError = io_err.into();
        assert!(matches!(err, OrchestratorError::Io(_)));
        assert_eq!(err.exit_code(), EXIT_FAILURE);
    }
}
