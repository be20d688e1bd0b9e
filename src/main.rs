//! Stackrun - run a project's build, stack, chart and docs workflows.
//!
//! Every subcommand maps to exactly one external tool invocation. The exit
//! status of that tool becomes the exit status of this process.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stackrun::core::{Executor, OrchestratorError, Settings, EXIT_FAILURE};
use stackrun::{Operation, Orchestrator};

/// Run the local build, stack, chart and docs workflows of a project
#[derive(Parser)]
#[command(name = "stackrun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Project directory (default: current directory)
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    project_dir: Option<PathBuf>,

    /// Config file to use instead of <project>/stackrun.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Dry run mode - show what would be executed without running
    #[arg(long, global = true)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the container image, tagged and labeled with the revision
    BuildImage,

    /// Push the container image (requires a clean work tree)
    PushImage,

    /// Start the local stack
    Up,

    /// Stop the local stack
    Down,

    /// Show the local stack's containers
    Status,

    /// Show the local stack's logs
    Logs {
        /// Keep streaming new output
        #[arg(short, long)]
        follow: bool,

        /// Only show logs of this service
        service: Option<String>,
    },

    /// Lint the chart
    ChartLint,

    /// Package the chart (requires a clean work tree)
    ChartPackage,

    /// Build the documentation site
    DocsBuild,

    /// Serve the documentation site locally
    DocsServe,

    /// Deploy the documentation site (requires a clean work tree)
    DocsDeploy,

    /// Start the kubernetes development loop
    DevUp,

    /// Tear down the kubernetes development loop
    DevDown,

    /// Install web dependencies from the lockfile
    WebInstall,

    /// Remove build artifacts (docs site and chart packages)
    Clean,

    /// Show resolved configuration
    Config {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show which executable each tool resolves to
    Tools,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Output format for `config`.
#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Toml,
}

impl Commands {
    /// The orchestrator operation behind this subcommand, if any.
    fn operation(&self) -> Option<Operation> {
        let op = match self {
            Self::BuildImage => Operation::BuildImage,
            Self::PushImage => Operation::PushImage,
            Self::Up => Operation::Up,
            Self::Down => Operation::Down,
            Self::Status => Operation::Status,
            Self::Logs { follow, service } => {
                Operation::Logs { follow: *follow, service: service.clone() }
            }
            Self::ChartLint => Operation::ChartLint,
            Self::ChartPackage => Operation::ChartPackage,
            Self::DocsBuild => Operation::DocsBuild,
            Self::DocsServe => Operation::DocsServe,
            Self::DocsDeploy => Operation::DocsDeploy,
            Self::DevUp => Operation::DevUp,
            Self::DevDown => Operation::DevDown,
            Self::WebInstall => Operation::WebInstall,
            Self::Clean => Operation::Clean,
            Self::Config { .. } | Self::Tools | Self::Completions { .. } => return None,
        };
        Some(op)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<OrchestratorError>()
                .map_or(EXIT_FAILURE, OrchestratorError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        cmd_completions(shell);
        return Ok(());
    }

    let project_dir = match cli.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    debug!("Project directory: {}", project_dir.display());

    let settings = Settings::from_process(&project_dir, cli.config.as_deref())?;
    let orchestrator = Orchestrator::new(settings, Executor::new().dry_run(cli.dry_run));

    match cli.command {
        Commands::Config { format } => cmd_config(&orchestrator, format),
        Commands::Tools => cmd_tools(&orchestrator),
        ref command => {
            let Some(op) = command.operation() else {
                return Ok(());
            };
            cmd_operation(&orchestrator, &op, cli.dry_run)
        }
    }
}

/// Run one orchestrator operation.
fn cmd_operation(orchestrator: &Orchestrator, op: &Operation, dry_run: bool) -> Result<()> {
    // The child owns Ctrl-C; its exit status is what gets reported.
    if !dry_run {
        if let Err(e) = ctrlc::set_handler(|| {}) {
            warn!("Failed to install interrupt handler: {}", e);
        }
    }

    let outcome = orchestrator.run(op)?;

    if !dry_run {
        if let Some(artifact) = &outcome.artifact {
            println!("{}", artifact.display());
        }
        for path in &outcome.removed {
            println!("Removed {}", path.display());
        }
    }

    Ok(())
}

/// Show resolved configuration.
fn cmd_config(orchestrator: &Orchestrator, format: Format) -> Result<()> {
    let reports = orchestrator.describe();

    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Format::Toml => {
            let table: toml::Table = reports
                .iter()
                .filter_map(|r| r.value.clone().map(|v| (r.name.clone(), toml::Value::String(v))))
                .collect();
            let mut doc = toml::Table::new();
            doc.insert("vars".to_string(), toml::Value::Table(table));
            print!("{}", toml::to_string_pretty(&doc)?);
        }
        Format::Text => {
            let width = reports.iter().map(|r| r.name.len()).max().unwrap_or(0);
            for report in &reports {
                match (&report.value, report.source) {
                    (Some(value), Some(source)) => {
                        println!("{:width$}  {}  ({})", report.name, value, source.label());
                    }
                    _ => println!(
                        "{:width$}  <missing>  ({})",
                        report.name,
                        report.error.as_deref().unwrap_or("unresolved")
                    ),
                }
            }
        }
    }

    Ok(())
}

/// Show which executable each tool resolves to.
fn cmd_tools(orchestrator: &Orchestrator) -> Result<()> {
    let mut missing = None;

    for (kind, resolved) in orchestrator.tool_report() {
        match resolved {
            Ok(tool) => {
                let mut line = tool.program.display().to_string();
                for arg in &tool.prefix {
                    line.push(' ');
                    line.push_str(arg);
                }
                println!("{:20} {}", kind.display_name(), line);
            }
            Err(e) => {
                println!("{:20} not found", kind.display_name());
                debug!("{}", e);
                missing.get_or_insert(e);
            }
        }
    }

    match missing {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "stackrun", &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_verifies() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["stackrun", "build-image", "--dry-run", "-C", "/work"]).unwrap();
        assert!(cli.dry_run);
        assert_eq!(cli.project_dir, Some(PathBuf::from("/work")));
        assert_eq!(cli.command.operation(), Some(Operation::BuildImage));
    }

    #[test]
    fn test_logs_arguments() {
        let cli = Cli::try_parse_from(["stackrun", "logs", "-f", "api"]).unwrap();
        assert_eq!(
            cli.command.operation(),
            Some(Operation::Logs { follow: true, service: Some("api".to_string()) })
        );
    }

    #[test]
    fn test_introspection_commands_have_no_operation() {
        let cli = Cli::try_parse_from(["stackrun", "config", "--format", "json"]).unwrap();
        assert!(cli.command.operation().is_none());
        let cli = Cli::try_parse_from(["stackrun", "tools"]).unwrap();
        assert!(cli.command.operation().is_none());
    }

    #[test]
    fn test_unknown_operation_is_rejected() {
        assert!(Cli::try_parse_from(["stackrun", "deploy-everything"]).is_err());
    }
}
