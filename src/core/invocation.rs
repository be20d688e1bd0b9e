//! Command invocation data structures.
//!
//! An `Invocation` is the fully composed command line for one operation:
//! the resolved program, its arguments, a working directory and the extra
//! environment handed to the child.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::tool::ResolvedTool;

/// A single external command, ready to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    /// Tool display name, used in error messages
    pub tool: String,

    /// Executable to run
    pub program: PathBuf,

    /// Arguments, in order
    pub args: Vec<String>,

    /// Working directory for execution
    pub working_dir: PathBuf,

    /// Environment variables to set when running
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// Start an invocation of a resolved tool.
    ///
    /// The tool's sub-command prefix becomes the first arguments.
    pub fn new(tool: &ResolvedTool, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.name.clone(),
            program: tool.program.clone(),
            args: tool.prefix.clone(),
            working_dir: working_dir.into(),
            env: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set several environment variables for the child.
    #[must_use]
    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    /// The command line as a copy-pasteable shell string.
    pub fn command_line(&self) -> String {
        let mut parts = vec![quote(&self.program.to_string_lossy())];
        parts.extend(self.args.iter().map(|a| quote(a)));
        parts.join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{key}={} ", quote(value))?;
        }
        f.write_str(&self.command_line())
    }
}

/// Single-quote a token when the shell would otherwise split or expand it.
fn quote(token: &str) -> String {
    let plain = !token.is_empty()
        && token.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if plain {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}
