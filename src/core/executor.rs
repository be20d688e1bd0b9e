//! Command execution module.
//!
//! Spawns the external tool for an [`Invocation`] and turns its exit status
//! into a result. Output is passed through to the terminal unless capture is
//! requested, so the tool's own error text reaches the user unmodified.

use std::io::Write;
use std::process::{Command as ProcessCommand, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::error::{OrchestratorError, Result};
use super::invocation::Invocation;

/// Result of executing an invocation.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Exit status of the process (None for a dry run)
    pub status: Option<ExitStatus>,

    /// Standard output (if captured)
    pub stdout: Option<String>,

    /// Standard error (if captured)
    pub stderr: Option<String>,

    /// Time taken to execute
    pub duration: Duration,
}

impl ExecutionResult {
    /// Check if the command succeeded (exit code 0). Dry runs succeed.
    pub fn success(&self) -> bool {
        self.status.map_or(true, |s| s.success())
    }

    /// Get the exit code, mapping signal termination to `128 + signal`.
    pub fn code(&self) -> Option<i32> {
        self.status.map(exit_code)
    }
}

/// Command executor.
#[derive(Debug, Default)]
pub struct Executor {
    /// Whether to capture output (vs pass through to terminal)
    pub capture_output: bool,

    /// Print the command line instead of running it
    pub dry_run: bool,
}

impl Executor {
    /// Create a new executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to capture output.
    #[must_use]
    pub fn capture(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    /// Set dry-run mode.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Execute an invocation and report its status.
    ///
    /// A non-zero exit is not an error here; see [`Executor::run_checked`].
    pub fn execute(&self, invocation: &Invocation) -> Result<ExecutionResult> {
        if self.dry_run {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{invocation}")?;
            return Ok(ExecutionResult {
                status: None,
                stdout: None,
                stderr: None,
                duration: Duration::ZERO,
            });
        }

        info!("Running: {}", invocation);
        let start = Instant::now();

        let mut cmd = ProcessCommand::new(&invocation.program);
        cmd.args(&invocation.args).current_dir(&invocation.working_dir);

        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }

        if self.capture_output {
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
            cmd.stdin(Stdio::inherit());
        }

        let output = cmd.output()?;
        let duration = start.elapsed();
        debug!("{} finished with {} in {:?}", invocation.tool, output.status, duration);

        let (stdout, stderr) = if self.capture_output {
            (
                Some(String::from_utf8_lossy(&output.stdout).to_string()),
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
            )
        } else {
            (None, None)
        };

        Ok(ExecutionResult { status: Some(output.status), stdout, stderr, duration })
    }

    /// Execute an invocation, failing on a non-zero exit.
    pub fn run_checked(&self, invocation: &Invocation) -> Result<ExecutionResult> {
        let result = self.execute(invocation)?;
        if result.success() {
            Ok(result)
        } else {
            Err(OrchestratorError::UpstreamToolFailure {
                tool: invocation.tool.clone(),
                code: result.code().unwrap_or(1),
            })
        }
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status.code().or_else(|| status.signal().map(|s| 128 + s)).unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
