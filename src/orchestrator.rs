//! The named operations and their resolve-then-execute sequence.
//!
//! Every operation follows the same order: resolve configuration variables,
//! resolve the tool, check the workspace precondition, then run exactly one
//! external command. Nothing is spawned until all three preconditions hold.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::chart::ChartMetadata;
use crate::core::{
    Executor, Invocation, OrchestratorError, ResolvedTool, Result, Settings, ToolKind,
    ToolResolver, ValueSource, VARIABLES,
};
use crate::git;

/// Label key carrying the revision on built images.
pub const REVISION_LABEL: &str = "org.opencontainers.image.revision";

/// A named operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Build the container image
    BuildImage,
    /// Push the container image
    PushImage,
    /// Start the local stack
    Up,
    /// Stop the local stack
    Down,
    /// Show the local stack's containers
    Status,
    /// Show the local stack's logs
    Logs { follow: bool, service: Option<String> },
    /// Lint the chart
    ChartLint,
    /// Package the chart
    ChartPackage,
    /// Build the docs site
    DocsBuild,
    /// Serve the docs site locally
    DocsServe,
    /// Deploy the docs site
    DocsDeploy,
    /// Start the kubernetes dev loop
    DevUp,
    /// Tear down the kubernetes dev loop
    DevDown,
    /// Install web dependencies
    WebInstall,
    /// Remove build artifacts
    Clean,
}

impl Operation {
    /// Operation name as used on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BuildImage => "build-image",
            Self::PushImage => "push-image",
            Self::Up => "up",
            Self::Down => "down",
            Self::Status => "status",
            Self::Logs { .. } => "logs",
            Self::ChartLint => "chart-lint",
            Self::ChartPackage => "chart-package",
            Self::DocsBuild => "docs-build",
            Self::DocsServe => "docs-serve",
            Self::DocsDeploy => "docs-deploy",
            Self::DevUp => "dev-up",
            Self::DevDown => "dev-down",
            Self::WebInstall => "web-install",
            Self::Clean => "clean",
        }
    }

    /// The tool this operation delegates to (None for `clean`).
    pub fn tool(&self) -> Option<ToolKind> {
        match self {
            Self::BuildImage | Self::PushImage => Some(ToolKind::ContainerEngine),
            Self::Up | Self::Down | Self::Status | Self::Logs { .. } => Some(ToolKind::Compose),
            Self::ChartLint | Self::ChartPackage => Some(ToolKind::ChartManager),
            Self::DocsBuild | Self::DocsServe | Self::DocsDeploy => Some(ToolKind::DocsGenerator),
            Self::DevUp | Self::DevDown => Some(ToolKind::KubeDev),
            Self::WebInstall => Some(ToolKind::WebPackageManager),
            Self::Clean => None,
        }
    }

    /// Whether the operation publishes something and needs a clean tree.
    pub fn requires_clean(&self) -> bool {
        matches!(self, Self::PushImage | Self::ChartPackage | Self::DocsDeploy)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fully resolved operation, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// The single external command
    pub invocation: Invocation,

    /// Output the tool must produce
    pub artifact: Option<PathBuf>,

    /// Directories to create right before running
    pub create_dirs: Vec<PathBuf>,
}

impl Plan {
    fn new(invocation: Invocation) -> Self {
        Self { invocation, artifact: None, create_dirs: Vec::new() }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Artifact produced by the tool
    pub artifact: Option<PathBuf>,

    /// Paths removed by `clean`
    pub removed: Vec<PathBuf>,
}

/// A configuration variable as reported by `stackrun config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableReport {
    /// Variable name
    pub name: String,

    /// Resolved value (None when it cannot be resolved)
    pub value: Option<String>,

    /// Where the value came from
    pub source: Option<ValueSource>,

    /// Why resolution failed, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Resolves configuration and tools, and runs operations.
pub struct Orchestrator {
    settings: Settings,
    resolver: ToolResolver,
    executor: Executor,
}

impl Orchestrator {
    /// Create an orchestrator over a settings snapshot.
    pub fn new(settings: Settings, executor: Executor) -> Self {
        let resolver = ToolResolver::from_settings(&settings);
        Self { settings, resolver, executor }
    }

    /// The settings snapshot.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Revision identifier: `REVISION`, else the HEAD commit.
    pub fn revision(&self) -> Result<(String, ValueSource)> {
        match self.settings.lookup("REVISION") {
            Some(found) => Ok(found),
            None => Ok((git::head_revision(self.settings.project_dir())?, ValueSource::Derived)),
        }
    }

    /// Image tag: `IMAGE_TAG`, else the revision.
    pub fn image_tag(&self) -> Result<(String, ValueSource)> {
        match self.settings.lookup("IMAGE_TAG") {
            Some(found) => Ok(found),
            None => Ok((self.revision()?.0, ValueSource::Derived)),
        }
    }

    /// Tag handed to the compose file: `COMPOSE_TAG`, else the image tag.
    pub fn compose_tag(&self) -> Result<(String, ValueSource)> {
        match self.settings.lookup("COMPOSE_TAG") {
            Some(found) => Ok(found),
            None => Ok((self.image_tag()?.0, ValueSource::Derived)),
        }
    }

    /// Chart version: `CHART_VERSION`, else the version in `Chart.yaml`.
    pub fn chart_version(&self, meta: &ChartMetadata) -> (String, ValueSource) {
        self.settings
            .lookup("CHART_VERSION")
            .unwrap_or_else(|| (meta.version.clone(), ValueSource::Derived))
    }

    /// Full image reference `repository:tag`.
    pub fn image_ref(&self) -> Result<String> {
        let repository = self.settings.require("IMAGE_REPOSITORY")?;
        let (tag, _) = self.image_tag()?;
        Ok(format!("{repository}:{tag}"))
    }

    /// Resolve a tool.
    pub fn resolve_tool(&self, kind: ToolKind) -> Result<ResolvedTool> {
        self.resolver.resolve(kind, &self.settings)
    }

    /// Resolve everything an operation needs and compose its command.
    ///
    /// Fails before any side effect when a variable, the tool or the
    /// workspace precondition is missing.
    pub fn plan(&self, op: &Operation) -> Result<Plan> {
        let no_tool = || OrchestratorError::config(format!("'{op}' does not run an external tool"));
        let kind = op.tool().ok_or_else(no_tool)?;

        let plan = match op {
            Operation::BuildImage => {
                let dockerfile = self.settings.require("DOCKERFILE")?;
                let context = self.settings.require("BUILD_CONTEXT")?;
                let image = self.image_ref()?;
                let (revision, _) = self.revision()?;
                let tool = self.resolve_tool(kind)?;

                Plan::new(
                    self.invocation(&tool)
                        .arg("build")
                        .args(["-f", dockerfile.as_str(), "-t", image.as_str()])
                        .arg("--label")
                        .arg(format!("{REVISION_LABEL}={revision}"))
                        .arg(context),
                )
            }
            Operation::PushImage => {
                let image = self.image_ref()?;
                let tool = self.resolve_tool(kind)?;
                Plan::new(self.invocation(&tool).arg("push").arg(image))
            }
            Operation::Up | Operation::Down | Operation::Status | Operation::Logs { .. } => {
                let compose_file = self.settings.require("COMPOSE_FILE")?;
                let repository = self.settings.require("IMAGE_REPOSITORY")?;
                let (tag, _) = self.compose_tag()?;
                let tool = self.resolve_tool(kind)?;

                let mut inv = self
                    .invocation(&tool)
                    .args(["-f", compose_file.as_str()])
                    .env("IMAGE_REPOSITORY", repository)
                    .env("TAG", tag);

                inv = match op {
                    Operation::Up => inv.args(["up", "-d"]),
                    Operation::Down => inv.arg("down"),
                    Operation::Status => inv.arg("ps"),
                    Operation::Logs { follow, service } => {
                        let mut inv = inv.arg("logs");
                        if *follow {
                            inv = inv.arg("--follow");
                        }
                        if let Some(service) = service {
                            inv = inv.arg(service.as_str());
                        }
                        inv
                    }
                    _ => inv,
                };
                Plan::new(inv)
            }
            Operation::ChartLint => {
                let chart_dir = self.settings.require("CHART_DIR")?;
                let tool = self.resolve_tool(kind)?;
                Plan::new(self.invocation(&tool).arg("lint").arg(chart_dir))
            }
            Operation::ChartPackage => {
                let chart_dir = self.settings.require("CHART_DIR")?;
                let dist = self.settings.require("CHART_DIST")?;
                let (revision, _) = self.revision()?;
                let meta = ChartMetadata::load(&self.settings.require_path("CHART_DIR")?)?;
                let (version, _) = self.chart_version(&meta);
                let dist_path = self.settings.require_path("CHART_DIST")?;
                let tool = self.resolve_tool(kind)?;

                let inv = self
                    .invocation(&tool)
                    .arg("package")
                    .arg(chart_dir)
                    .args(["--destination", dist.as_str()])
                    .args(["--version", version.as_str()])
                    .args(["--app-version", revision.as_str()]);

                Plan {
                    invocation: inv,
                    artifact: Some(meta.package_path(&dist_path, &version)),
                    create_dirs: vec![dist_path],
                }
            }
            Operation::DocsBuild => {
                let config = self.settings.require("MKDOCS_CONFIG")?;
                let site_dir = self.settings.require("SITE_DIR")?;
                let tool = self.resolve_tool(kind)?;
                Plan::new(
                    self.invocation(&tool)
                        .args(["build", "--strict"])
                        .args(["--config-file", config.as_str()])
                        .args(["--site-dir", site_dir.as_str()]),
                )
            }
            Operation::DocsServe => {
                let config = self.settings.require("MKDOCS_CONFIG")?;
                let addr = self.settings.require("DOCS_ADDR")?;
                let tool = self.resolve_tool(kind)?;
                Plan::new(
                    self.invocation(&tool)
                        .arg("serve")
                        .args(["--config-file", config.as_str()])
                        .args(["--dev-addr", addr.as_str()]),
                )
            }
            Operation::DocsDeploy => {
                let config = self.settings.require("MKDOCS_CONFIG")?;
                let (revision, _) = self.revision()?;
                let tool = self.resolve_tool(kind)?;
                Plan::new(
                    self.invocation(&tool)
                        .args(["gh-deploy", "--force"])
                        .args(["--config-file", config.as_str()])
                        .arg("--message")
                        .arg(format!("Deploy docs for {revision}")),
                )
            }
            Operation::DevUp | Operation::DevDown => {
                let tiltfile = self.settings.require("TILTFILE")?;
                let tool = self.resolve_tool(kind)?;
                let action = if *op == Operation::DevUp { "up" } else { "down" };
                Plan::new(self.invocation(&tool).arg(action).args(["--file", tiltfile.as_str()]))
            }
            Operation::WebInstall => {
                let web_dir = self.settings.require_path("WEB_DIR")?;
                let tool = self.resolve_tool(kind)?;
                let args: &[&str] = match tool.name.as_str() {
                    "npm" => &["ci"],
                    "yarn" | "pnpm" => &["install", "--frozen-lockfile"],
                    _ => &["install"],
                };

                let mut inv = self.invocation(&tool).args(args.iter().copied());
                inv.working_dir = web_dir;
                Plan::new(inv)
            }
            Operation::Clean => return Err(no_tool()),
        };

        if op.requires_clean() {
            git::ensure_clean(self.settings.project_dir())?;
        }

        debug!("Planned {}: {}", op, plan.invocation);
        Ok(plan)
    }

    /// Run an operation to completion.
    pub fn run(&self, op: &Operation) -> Result<Outcome> {
        if *op == Operation::Clean {
            return self.clean();
        }

        let plan = self.plan(op)?;

        if !self.executor.dry_run {
            for dir in &plan.create_dirs {
                std::fs::create_dir_all(dir)?;
            }
            // A leftover from an earlier run must not pass the artifact check.
            if let Some(ref artifact) = plan.artifact {
                if artifact.is_file() {
                    debug!("Removing stale {}", artifact.display());
                    std::fs::remove_file(artifact)?;
                }
            }
        }

        self.executor.run_checked(&plan.invocation)?;

        if let Some(ref artifact) = plan.artifact {
            if !self.executor.dry_run && !artifact.exists() {
                return Err(OrchestratorError::ArtifactMissing(artifact.clone()));
            }
        }

        info!("{} completed", op);
        Ok(Outcome { artifact: plan.artifact, removed: Vec::new() })
    }

    /// Remove the wholesale-removable build outputs.
    fn clean(&self) -> Result<Outcome> {
        let targets = [self.removable("SITE_DIR")?, self.removable("CHART_DIST")?];

        let mut removed = Vec::new();
        for path in targets {
            if !path.exists() {
                continue;
            }

            if self.executor.dry_run {
                println!("rm -rf {}", path.display());
            } else {
                info!("Removing {}", path.display());
                if path.is_dir() {
                    std::fs::remove_dir_all(&path)?;
                } else {
                    std::fs::remove_file(&path)?;
                }
            }
            removed.push(path);
        }

        Ok(Outcome { artifact: None, removed })
    }

    /// Resolve a directory variable that `clean` may delete.
    ///
    /// The value must be a relative path made only of plain names, so the
    /// target is always strictly inside the project directory.
    fn removable(&self, name: &str) -> Result<PathBuf> {
        let value = self.settings.require(name)?;
        let relative = Path::new(&value);
        let plain = relative.components().next().is_some()
            && relative.components().all(|c| matches!(c, Component::Normal(_)));

        if !plain {
            return Err(OrchestratorError::config(format!(
                "refusing to remove {name}={value}: not a path inside the project directory"
            )));
        }
        Ok(self.settings.project_dir().join(relative))
    }

    /// Report every configuration variable with its value and source.
    ///
    /// Unresolvable values are reported instead of aborting.
    pub fn describe(&self) -> Vec<VariableReport> {
        fn report(name: &str, resolved: Result<(String, ValueSource)>) -> VariableReport {
            match resolved {
                Ok((value, source)) => VariableReport {
                    name: name.to_string(),
                    value: Some(value),
                    source: Some(source),
                    error: None,
                },
                Err(e) => VariableReport {
                    name: name.to_string(),
                    value: None,
                    source: None,
                    error: Some(e.to_string()),
                },
            }
        }

        let mut reports: Vec<VariableReport> = VARIABLES
            .iter()
            .map(|v| {
                report(
                    v.name,
                    self.settings
                        .resolve(v.name)
                        .ok_or_else(|| OrchestratorError::missing(v.name, "no value and no default")),
                )
            })
            .collect();

        reports.push(report("REVISION", self.revision()));
        reports.push(report("IMAGE_TAG", self.image_tag()));
        reports.push(report("COMPOSE_TAG", self.compose_tag()));
        reports.push(report(
            "CHART_VERSION",
            self.settings
                .require_path("CHART_DIR")
                .and_then(|dir| ChartMetadata::load(&dir))
                .map(|meta| self.chart_version(&meta)),
        ));

        for kind in ToolKind::ALL {
            let var = kind.override_var();
            if let Some(value) = self.settings.tool_override(kind.key(), var) {
                let source = self.settings.lookup(var).map_or(ValueSource::File, |(_, s)| s);
                reports.push(report(var, Ok((value, source))));
            }
        }

        reports
    }

    /// Resolve every tool, keeping failures.
    pub fn tool_report(&self) -> Vec<(ToolKind, Result<ResolvedTool>)> {
        ToolKind::ALL.iter().map(|kind| (*kind, self.resolve_tool(*kind))).collect()
    }

    fn invocation(&self, tool: &ResolvedTool) -> Invocation {
        Invocation::new(tool, self.settings.project_dir()).envs(self.settings.child_env())
    }
}
