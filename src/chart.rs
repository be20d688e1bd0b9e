//! Chart metadata.
//!
//! Reads the fields of `Chart.yaml` needed to predict the package file the
//! chart manager writes: `<name>-<version>.tgz` in the destination directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::{OrchestratorError, Result};

/// File holding the chart metadata.
pub const CHART_FILE: &str = "Chart.yaml";

/// The subset of `Chart.yaml` the orchestrator reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChartMetadata {
    /// Chart name
    pub name: String,

    /// Chart version (SemVer)
    pub version: String,
}

impl ChartMetadata {
    /// Parse chart metadata from YAML text.
    pub fn parse(content: &str) -> Result<Self> {
        let meta: Self = serde_yaml::from_str(content)
            .map_err(|e| OrchestratorError::config(format!("{CHART_FILE}: {e}")))?;

        if meta.name.trim().is_empty() {
            return Err(OrchestratorError::config(format!("{CHART_FILE}: empty chart name")));
        }
        Ok(meta)
    }

    /// Load chart metadata from a chart directory.
    pub fn load(chart_dir: &Path) -> Result<Self> {
        let path = chart_dir.join(CHART_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            OrchestratorError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Path of the package archive for a given version.
    pub fn package_path(&self, dist: &Path, version: &str) -> PathBuf {
        dist.join(format!("{}-{}.tgz", self.name, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHART: &str = r"
apiVersion: v2
name: shop
description: The shop service
type: application
version: 1.4.2
appVersion: '2.0.0'
";

    #[test]
    fn test_parse_chart() {
        let meta = ChartMetadata::parse(CHART).unwrap();
        assert_eq!(meta.name, "shop");
        assert_eq!(meta.version, "1.4.2");
    }

    #[test]
    fn test_missing_version_is_an_error() {
        let err = ChartMetadata::parse("apiVersion: v2\nname: shop\n").unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));
    }

    #[test]
    fn test_empty_name_is_an_error() {
        let err = ChartMetadata::parse("name: ''\nversion: 0.1.0\n").unwrap_err();
        assert!(err.to_string().contains("empty chart name"));
    }

    #[test]
    fn test_package_path() {
        let meta = ChartMetadata::parse(CHART).unwrap();
        assert_eq!(
            meta.package_path(Path::new("/work/dist"), "1.5.0"),
            PathBuf::from("/work/dist/shop-1.5.0.tgz")
        );
    }

    #[test]
    fn test_load_missing_chart() {
        let dir = tempfile::tempdir().unwrap();
        let err = ChartMetadata::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Chart.yaml"));
    }
}
