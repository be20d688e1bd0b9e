//! External tool references and their resolution.
//!
//! A tool is resolved by probing a fixed, ordered list of candidate
//! executables against the search path. The first candidate found wins, so
//! the result only depends on which binaries are installed and on `PATH`.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use super::config::Settings;
use super::error::{OrchestratorError, Result};

/// A candidate executable for a tool.
///
/// `prefix` holds sub-command tokens that always precede the operation's
/// arguments, e.g. the `compose` in `docker compose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// Program name looked up on the search path
    pub program: &'static str,

    /// Leading arguments
    pub prefix: &'static [&'static str],
}

impl Candidate {
    const fn bare(program: &'static str) -> Self {
        Self { program, prefix: &[] }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in self.prefix {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

const ENGINE_CANDIDATES: &[Candidate] = &[Candidate::bare("docker"), Candidate::bare("podman")];

const COMPOSE_CANDIDATES: &[Candidate] = &[
    Candidate::bare("docker-compose"),
    Candidate { program: "docker", prefix: &["compose"] },
    Candidate::bare("podman-compose"),
];

const KUBE_DEV_CANDIDATES: &[Candidate] = &[Candidate::bare("tilt")];

const CHART_CANDIDATES: &[Candidate] = &[Candidate::bare("helm")];

const DOCS_CANDIDATES: &[Candidate] = &[Candidate::bare("mkdocs")];

const WEB_PM_CANDIDATES: &[Candidate] =
    &[Candidate::bare("npm"), Candidate::bare("yarn"), Candidate::bare("pnpm")];

/// The external tools the orchestrator delegates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    /// Builds and pushes images
    ContainerEngine,
    /// Starts and stops the local stack
    Compose,
    /// Kubernetes development loop
    KubeDev,
    /// Lints and packages the chart
    ChartManager,
    /// Builds, serves and deploys the docs site
    DocsGenerator,
    /// Installs web dependencies
    WebPackageManager,
}

impl ToolKind {
    /// All tools, in display order.
    pub const ALL: [Self; 6] = [
        Self::ContainerEngine,
        Self::Compose,
        Self::KubeDev,
        Self::ChartManager,
        Self::DocsGenerator,
        Self::WebPackageManager,
    ];

    /// Human-readable name.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::ContainerEngine => "container engine",
            Self::Compose => "compose tool",
            Self::KubeDev => "kubernetes dev tool",
            Self::ChartManager => "chart manager",
            Self::DocsGenerator => "docs generator",
            Self::WebPackageManager => "web package manager",
        }
    }

    /// Key in the `[tools]` table of the config file.
    pub fn key(self) -> &'static str {
        match self {
            Self::ContainerEngine => "engine",
            Self::Compose => "compose",
            Self::KubeDev => "tilt",
            Self::ChartManager => "helm",
            Self::DocsGenerator => "mkdocs",
            Self::WebPackageManager => "web",
        }
    }

    /// Environment variable that overrides the executable.
    pub fn override_var(self) -> &'static str {
        match self {
            Self::ContainerEngine => "CONTAINER_ENGINE",
            Self::Compose => "COMPOSE",
            Self::KubeDev => "TILT",
            Self::ChartManager => "HELM",
            Self::DocsGenerator => "MKDOCS",
            Self::WebPackageManager => "WEB_PM",
        }
    }

    /// Candidates in preference order.
    pub fn candidates(self) -> &'static [Candidate] {
        match self {
            Self::ContainerEngine => ENGINE_CANDIDATES,
            Self::Compose => COMPOSE_CANDIDATES,
            Self::KubeDev => KUBE_DEV_CANDIDATES,
            Self::ChartManager => CHART_CANDIDATES,
            Self::DocsGenerator => DOCS_CANDIDATES,
            Self::WebPackageManager => WEB_PM_CANDIDATES,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A tool whose executable has been located.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTool {
    /// Which tool this is
    pub kind: ToolKind,

    /// Short name of the chosen executable (e.g. `yarn`)
    pub name: String,

    /// Absolute or project-relative path to the executable
    pub program: PathBuf,

    /// Sub-command tokens placed before the operation's arguments
    pub prefix: Vec<String>,
}

/// Locates tool executables on a search path.
#[derive(Debug, Clone, Default)]
pub struct ToolResolver {
    search_path: Vec<PathBuf>,
    base_dir: PathBuf,
}

impl ToolResolver {
    /// Create a resolver over a `PATH`-style string.
    ///
    /// Explicit relative program paths resolve against `base_dir`.
    pub fn new(path_var: Option<&str>, base_dir: impl Into<PathBuf>) -> Self {
        let search_path = path_var
            .map(|p| std::env::split_paths(OsStr::new(p)).filter(|d| !d.as_os_str().is_empty()).collect())
            .unwrap_or_default();
        Self { search_path, base_dir: base_dir.into() }
    }

    /// Create a resolver from a settings snapshot.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.search_path(), settings.project_dir())
    }

    /// Find an executable by name or path.
    ///
    /// Names containing a path separator are checked directly; bare names
    /// are probed in search path order.
    pub fn find_program(&self, program: &str) -> Option<PathBuf> {
        let as_path = Path::new(program);
        if as_path.components().count() > 1 || as_path.is_absolute() {
            let path = self.base_dir.join(as_path);
            return is_executable(&path).then_some(path);
        }

        self.search_path.iter().map(|dir| dir.join(program)).find(|p| is_executable(p))
    }

    /// Resolve a tool, honoring the override from the settings.
    pub fn resolve(&self, kind: ToolKind, settings: &Settings) -> Result<ResolvedTool> {
        let override_value = settings.tool_override(kind.key(), kind.override_var());
        self.resolve_with(kind, override_value.as_deref())
    }

    /// Resolve a tool with an explicit override.
    ///
    /// An override is the only candidate when present; it may carry leading
    /// sub-command tokens separated by whitespace (`docker compose`).
    pub fn resolve_with(&self, kind: ToolKind, override_value: Option<&str>) -> Result<ResolvedTool> {
        if let Some(value) = override_value {
            let mut tokens = value.split_whitespace();
            let Some(program) = tokens.next() else {
                return Err(OrchestratorError::missing(kind.override_var(), "empty override"));
            };
            let prefix: Vec<String> = tokens.map(String::from).collect();

            return match self.find_program(program) {
                Some(path) => {
                    debug!("Resolved {} from override: {}", kind, path.display());
                    Ok(ResolvedTool { kind, name: program_name(program), program: path, prefix })
                }
                None => Err(OrchestratorError::ToolNotFound {
                    tool: kind.display_name().to_string(),
                    candidates: format!("{value} (from {})", kind.override_var()),
                }),
            };
        }

        for candidate in kind.candidates() {
            if let Some(path) = self.find_program(candidate.program) {
                debug!("Resolved {} to {} ({})", kind, path.display(), candidate);
                return Ok(ResolvedTool {
                    kind,
                    name: candidate.program.to_string(),
                    program: path,
                    prefix: candidate.prefix.iter().map(|s| (*s).to_string()).collect(),
                });
            }
        }

        Err(OrchestratorError::ToolNotFound {
            tool: kind.display_name().to_string(),
            candidates: kind.candidates().iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
        })
    }
}

/// File stem of a program path (`/usr/bin/yarn` -> `yarn`).
fn program_name(program: &str) -> String {
    Path::new(program)
        .file_stem()
        .map_or_else(|| program.to_string(), |s| s.to_string_lossy().into_owned())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path).map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    if path.is_file() {
        return true;
    }
    path.extension().is_none() && path.with_extension("exe").is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn install(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn resolver(dirs: &[&Path]) -> ToolResolver {
        let joined = std::env::join_paths(dirs).unwrap();
        ToolResolver::new(joined.to_str(), "/")
    }

    #[test]
    fn test_first_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path(), "podman");
        let docker = install(dir.path(), "docker");

        let tool = resolver(&[dir.path()]).resolve_with(ToolKind::ContainerEngine, None).unwrap();
        assert_eq!(tool.program, docker);
        assert_eq!(tool.name, "docker");
        assert!(tool.prefix.is_empty());
    }

    #[test]
    fn test_falls_through_to_later_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let podman = install(dir.path(), "podman");

        let tool = resolver(&[dir.path()]).resolve_with(ToolKind::ContainerEngine, None).unwrap();
        assert_eq!(tool.program, podman);
    }

    #[test]
    fn test_compose_plugin_candidate() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path(), "docker");
        install(dir.path(), "podman-compose");

        let tool = resolver(&[dir.path()]).resolve_with(ToolKind::Compose, None).unwrap();
        assert_eq!(tool.name, "docker");
        assert_eq!(tool.prefix, vec!["compose"]);
    }

    #[test]
    fn test_search_path_order_is_respected() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let expected = install(first.path(), "helm");
        install(second.path(), "helm");

        let resolver = resolver(&[first.path(), second.path()]);
        for _ in 0..3 {
            let tool = resolver.resolve_with(ToolKind::ChartManager, None).unwrap();
            assert_eq!(tool.program, expected);
        }
    }

    #[test]
    fn test_non_executable_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mkdocs"), "not a program").unwrap();

        let err = resolver(&[dir.path()]).resolve_with(ToolKind::DocsGenerator, None).unwrap_err();
        assert!(matches!(err, OrchestratorError::ToolNotFound { .. }));
    }

    #[test]
    fn test_not_found_lists_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolver(&[dir.path()]).resolve_with(ToolKind::WebPackageManager, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Tool not found: web package manager (tried: npm, yarn, pnpm)"
        );
        assert!(err.is_precondition());
    }

    #[test]
    fn test_override_is_the_only_candidate() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path(), "docker");
        let podman = install(dir.path(), "podman");

        let resolver = resolver(&[dir.path()]);
        let tool = resolver.resolve_with(ToolKind::ContainerEngine, Some("podman")).unwrap();
        assert_eq!(tool.program, podman);

        let err = resolver.resolve_with(ToolKind::ContainerEngine, Some("nerdctl")).unwrap_err();
        assert!(err.to_string().contains("CONTAINER_ENGINE"));
    }

    #[test]
    fn test_override_with_path_and_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let docker = install(dir.path(), "docker");

        let value = format!("{} compose", docker.display());
        let tool = ToolResolver::new(None, "/").resolve_with(ToolKind::Compose, Some(&value)).unwrap();
        assert_eq!(tool.program, docker);
        assert_eq!(tool.name, "docker");
        assert_eq!(tool.prefix, vec!["compose"]);
    }

    #[test]
    fn test_empty_search_path_finds_nothing() {
        let err = ToolResolver::new(None, "/").resolve_with(ToolKind::ChartManager, None).unwrap_err();
        assert!(matches!(err, OrchestratorError::ToolNotFound { .. }));
    }
}
