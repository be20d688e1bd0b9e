//! Configuration management for Stackrun.
//!
//! Configuration variables are resolved, in order, from the process
//! environment, the project's `.env` file, the `[vars]` table of
//! `stackrun.toml` and finally the built-in defaults. The sources are
//! captured once into a [`Settings`] snapshot; nothing here writes to the
//! process environment.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{OrchestratorError, Result};

/// Name of the project-level config file.
pub const CONFIG_FILE_NAME: &str = "stackrun.toml";

/// A configuration variable with its built-in default.
#[derive(Debug, Clone, Copy)]
pub struct Variable {
    /// Environment variable name
    pub name: &'static str,

    /// Hard-coded fallback (None = derived or required)
    pub default: Option<&'static str>,

    /// Short description for `stackrun config`
    pub description: &'static str,
}

/// Every plain configuration variable, with its literal default.
///
/// Variables whose default is derived at runtime (revision, tags, chart
/// version) have no constant here; see `Orchestrator::describe`.
pub const VARIABLES: &[Variable] = &[
    Variable { name: "IMAGE_REPOSITORY", default: Some("localhost/app"), description: "image repository" },
    Variable { name: "DOCKERFILE", default: Some("Dockerfile"), description: "Dockerfile path" },
    Variable { name: "BUILD_CONTEXT", default: Some("."), description: "image build context" },
    Variable { name: "COMPOSE_FILE", default: Some("docker-compose.yml"), description: "compose file" },
    Variable { name: "CHART_DIR", default: Some("chart"), description: "chart directory" },
    Variable { name: "CHART_DIST", default: Some("dist"), description: "chart package destination" },
    Variable { name: "MKDOCS_CONFIG", default: Some("mkdocs.yml"), description: "docs site config" },
    Variable { name: "SITE_DIR", default: Some("site"), description: "docs build output" },
    Variable { name: "DOCS_ADDR", default: Some("127.0.0.1:8000"), description: "docs dev server address" },
    Variable { name: "TILTFILE", default: Some("Tiltfile"), description: "kubernetes dev tool file" },
    Variable { name: "WEB_DIR", default: Some("web"), description: "web package directory" },
];

/// Look up the built-in default for a variable.
pub fn default_for(name: &str) -> Option<&'static str> {
    VARIABLES.iter().find(|v| v.name == name).and_then(|v| v.default)
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    /// Process environment
    Env,
    /// Project `.env` file
    Dotenv,
    /// `stackrun.toml`
    File,
    /// Built-in constant
    Default,
    /// Computed from another value or from the repository
    Derived,
}

impl ValueSource {
    /// Label used in text output.
    pub fn label(self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::Dotenv => ".env",
            Self::File => "file",
            Self::Default => "default",
            Self::Derived => "derived",
        }
    }
}

/// Contents of `stackrun.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Values for configuration variables
    pub vars: BTreeMap<String, String>,

    /// Executable overrides keyed by tool key (`engine`, `compose`, ...)
    pub tools: BTreeMap<String, String>,

    /// `.env` loading
    pub dotenv: DotenvConfig,
}

/// `.env` loading settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DotenvConfig {
    /// Whether to read the project's dotenv file
    pub enabled: bool,

    /// Dotenv file name, relative to the project directory
    pub file: String,
}

impl Default for DotenvConfig {
    fn default() -> Self {
        Self { enabled: true, file: ".env".to_string() }
    }
}

impl Config {
    /// Load configuration for a project.
    ///
    /// Looks for config in:
    /// 1. the explicit path, if given (must exist)
    /// 2. `stackrun.toml` in the project directory
    /// 3. `~/.config/stackrun/config.toml`
    /// 4. Falls back to defaults
    pub fn load(project_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        let local_config = project_dir.join(CONFIG_FILE_NAME);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(config_dir) = Self::config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| OrchestratorError::config(format!("{}: {e}", path.display())))
    }

    /// Get the user config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("stackrun"))
    }
}

/// Read a dotenv file into a map without touching the process environment.
///
/// A missing file yields an empty map.
pub fn read_dotenv(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let iter = dotenvy::from_path_iter(path)
        .map_err(|e| OrchestratorError::config(format!("{}: {e}", path.display())))?;

    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) =
            item.map_err(|e| OrchestratorError::config(format!("{}: {e}", path.display())))?;
        vars.insert(key, value);
    }
    debug!("Read {} variables from {}", vars.len(), path.display());
    Ok(vars)
}

/// Snapshot of every configuration input for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    project_dir: PathBuf,
    env: HashMap<String, String>,
    dotenv: HashMap<String, String>,
    file: Config,
}

impl Settings {
    /// Create settings from explicit sources (no `.env`).
    pub fn new(project_dir: impl Into<PathBuf>, env: HashMap<String, String>, file: Config) -> Self {
        Self { project_dir: project_dir.into(), env, dotenv: HashMap::new(), file }
    }

    /// Capture settings from the running process.
    pub fn from_process(project_dir: &Path, config_path: Option<&Path>) -> Result<Self> {
        let file = Config::load(project_dir, config_path)?;
        let env: HashMap<String, String> = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();

        let dotenv = if file.dotenv.enabled {
            read_dotenv(&project_dir.join(&file.dotenv.file))?
        } else {
            HashMap::new()
        };

        Ok(Self::new(project_dir, env, file).with_dotenv(dotenv))
    }

    /// Attach values read from a dotenv file.
    #[must_use]
    pub fn with_dotenv(mut self, dotenv: HashMap<String, String>) -> Self {
        self.dotenv = dotenv;
        self
    }

    /// The project directory all relative paths resolve against.
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// The loaded config file contents.
    pub fn file(&self) -> &Config {
        &self.file
    }

    /// Look up a variable from the override sources, skipping empty values.
    pub fn lookup(&self, name: &str) -> Option<(String, ValueSource)> {
        if let Some(v) = self.env.get(name).filter(|v| !v.is_empty()) {
            return Some((v.clone(), ValueSource::Env));
        }
        if let Some(v) = self.dotenv.get(name).filter(|v| !v.is_empty()) {
            return Some((v.clone(), ValueSource::Dotenv));
        }
        self.file.vars.get(name).filter(|v| !v.is_empty()).map(|v| (v.clone(), ValueSource::File))
    }

    /// Get an override value, if any.
    pub fn get(&self, name: &str) -> Option<String> {
        self.lookup(name).map(|(v, _)| v)
    }

    /// Resolve a variable, falling back to its built-in default.
    pub fn resolve(&self, name: &str) -> Option<(String, ValueSource)> {
        self.lookup(name)
            .or_else(|| default_for(name).map(|d| (d.to_string(), ValueSource::Default)))
    }

    /// Resolve a variable or fail with `ConfigurationMissing`.
    pub fn require(&self, name: &str) -> Result<String> {
        self.resolve(name)
            .map(|(v, _)| v)
            .ok_or_else(|| OrchestratorError::missing(name, "no value and no default"))
    }

    /// Resolve a variable naming a path, relative to the project directory.
    pub fn require_path(&self, name: &str) -> Result<PathBuf> {
        let value = self.require(name)?;
        Ok(self.project_dir.join(value))
    }

    /// Executable override for a tool.
    ///
    /// The override variable wins over the `[tools]` table. `~` and `$VAR`
    /// references are expanded against this snapshot.
    pub fn tool_override(&self, key: &str, var: &str) -> Option<String> {
        let raw = self
            .get(var)
            .or_else(|| self.file.tools.get(key).filter(|v| !v.is_empty()).cloned())?;

        let home = || dirs::home_dir().map(|p| p.display().to_string());
        let expanded = shellexpand::full_with_context_no_errors(&raw, home, |name| self.get(name));
        Some(expanded.into_owned())
    }

    /// The executable search path.
    pub fn search_path(&self) -> Option<&str> {
        self.env.get("PATH").map(String::as_str)
    }

    /// Variables from `.env` that the environment does not already set.
    ///
    /// These are handed to child processes explicitly. An empty environment
    /// value counts as unset, so the `.env` value replaces it.
    pub fn child_env(&self) -> Vec<(String, String)> {
        let mut vars: Vec<_> = self
            .dotenv
            .iter()
            .filter(|(k, v)| !v.is_empty() && !self.env.get(*k).is_some_and(|e| !e.is_empty()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        vars.sort();
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let settings = Settings::new("/work", HashMap::new(), Config::default());

        assert_eq!(settings.require("IMAGE_REPOSITORY").unwrap(), "localhost/app");
        assert_eq!(settings.require("COMPOSE_FILE").unwrap(), "docker-compose.yml");
        assert_eq!(settings.require("CHART_DIR").unwrap(), "chart");
        assert_eq!(settings.require("DOCS_ADDR").unwrap(), "127.0.0.1:8000");
        assert_eq!(
            settings.resolve("SITE_DIR"),
            Some(("site".to_string(), ValueSource::Default))
        );
    }

    #[test]
    fn test_precedence() {
        let mut file = Config::default();
        file.vars.insert("IMAGE_REPOSITORY".into(), "from-file".into());
        file.vars.insert("CHART_DIR".into(), "charts/app".into());
        file.vars.insert("SITE_DIR".into(), "public".into());

        let settings = Settings::new(
            "/work",
            env(&[("IMAGE_REPOSITORY", "from-env")]),
            file,
        )
        .with_dotenv(env(&[("IMAGE_REPOSITORY", "from-dotenv"), ("CHART_DIR", "helm")]));

        assert_eq!(
            settings.resolve("IMAGE_REPOSITORY"),
            Some(("from-env".to_string(), ValueSource::Env))
        );
        assert_eq!(settings.resolve("CHART_DIR"), Some(("helm".to_string(), ValueSource::Dotenv)));
        assert_eq!(settings.resolve("SITE_DIR"), Some(("public".to_string(), ValueSource::File)));
    }

    #[test]
    fn test_empty_value_counts_as_unset() {
        let settings =
            Settings::new("/work", env(&[("IMAGE_REPOSITORY", "")]), Config::default());
        assert_eq!(settings.require("IMAGE_REPOSITORY").unwrap(), "localhost/app");
        assert!(settings.get("IMAGE_REPOSITORY").is_none());
    }

    #[test]
    fn test_require_without_default_fails() {
        let settings = Settings::new("/work", HashMap::new(), Config::default());
        let err = settings.require("REVISION").unwrap_err();
        assert!(matches!(err, OrchestratorError::ConfigurationMissing { ref name, .. } if name == "REVISION"));
    }

    #[test]
    fn test_require_path_is_project_relative() {
        let settings = Settings::new("/work", HashMap::new(), Config::default());
        assert_eq!(settings.require_path("CHART_DIST").unwrap(), PathBuf::from("/work/dist"));
    }

    #[test]
    fn test_tool_override_sources_and_expansion() {
        let mut file = Config::default();
        file.tools.insert("compose".into(), "podman-compose".into());
        file.tools.insert("helm".into(), "$TOOLS/helm".into());

        let settings = Settings::new(
            "/work",
            env(&[("CONTAINER_ENGINE", "podman"), ("TOOLS", "/opt/tools")]),
            file,
        );

        assert_eq!(settings.tool_override("engine", "CONTAINER_ENGINE").as_deref(), Some("podman"));
        assert_eq!(settings.tool_override("compose", "COMPOSE").as_deref(), Some("podman-compose"));
        assert_eq!(settings.tool_override("helm", "HELM").as_deref(), Some("/opt/tools/helm"));
        assert!(settings.tool_override("mkdocs", "MKDOCS").is_none());
    }

    #[test]
    fn test_child_env_skips_process_values() {
        let settings = Settings::new("/work", env(&[("A", "env")]), Config::default())
            .with_dotenv(env(&[("A", "dotenv"), ("B", "dotenv")]));
        assert_eq!(settings.child_env(), vec![("B".to_string(), "dotenv".to_string())]);
    }

    #[test]
    fn test_child_env_replaces_empty_process_values() {
        let settings = Settings::new("/work", env(&[("FOO", "")]), Config::default())
            .with_dotenv(env(&[("FOO", "bar"), ("EMPTY", "")]));

        assert_eq!(settings.lookup("FOO"), Some(("bar".to_string(), ValueSource::Dotenv)));
        assert_eq!(settings.child_env(), vec![("FOO".to_string(), "bar".to_string())]);
    }

    #[test]
    fn test_tool_override_expands_home() {
        let mut file = Config::default();
        file.tools.insert("helm".into(), "~/bin/helm".into());
        let settings = Settings::new("/work", HashMap::new(), file);

        let expanded = settings.tool_override("helm", "HELM").unwrap();
        match dirs::home_dir() {
            Some(home) => assert_eq!(expanded, format!("{}/bin/helm", home.display())),
            None => assert_eq!(expanded, "~/bin/helm"),
        }
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [vars]
            IMAGE_REPOSITORY = "ghcr.io/acme/shop"

            [tools]
            compose = "docker compose"

            [dotenv]
            enabled = false
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.vars["IMAGE_REPOSITORY"], "ghcr.io/acme/shop");
        assert_eq!(config.tools["compose"], "docker compose");
        assert!(!config.dotenv.enabled);
        assert_eq!(config.dotenv.file, ".env");
    }

    #[test]
    fn test_load_from_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[vars]\nCHART_DIR = \"deploy\"\n")
            .unwrap();

        let config = Config::load(dir.path(), None).unwrap();
        assert_eq!(config.vars["CHART_DIR"], "deploy");
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[vars\n").unwrap();

        let err = Config::load(dir.path(), Some(&path)).unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));
    }

    #[test]
    fn test_read_dotenv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "# comment\nIMAGE_TAG=v1\nQUOTED=\"a b\"\n").unwrap();

        let vars = read_dotenv(&path).unwrap();
        assert_eq!(vars["IMAGE_TAG"], "v1");
        assert_eq!(vars["QUOTED"], "a b");

        assert!(read_dotenv(&dir.path().join("missing.env")).unwrap().is_empty());
    }
}
