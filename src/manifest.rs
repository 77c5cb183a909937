//! Project manifests: the files that carry a project's name and version.
//!
//! Manifests are read lazily on first access and cached. Writing a new version
//! rewrites only the version token in the cached text so formatting, key order
//! and unrelated fields survive byte-for-byte.
use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{Result, version::prerelease_identifiers};

/// Cargo.toml manifest support.
pub mod cargo_toml;

/// Manifest that fans version writes out to subordinate manifests.
pub mod composed;

/// package.json manifest support.
pub mod package_json;

pub use cargo_toml::CargoTomlManifest;
pub use composed::ComposedManifest;
pub use package_json::PackageJsonManifest;

/// Record of one version change applied to a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionUpdate {
    /// Project name read from the manifest.
    pub name: String,
    /// Version before the update.
    pub from: Version,
    /// Version after the update.
    pub to: Version,
    /// Files touched by the update.
    pub files: Vec<PathBuf>,
    /// Release notes generated for the update. Empty when produced by a
    /// manifest alone.
    pub notes: String,
}

/// Read/write access to a project manifest.
#[async_trait]
pub trait Manifest: Send + Sync {
    /// Path to the manifest file.
    fn path(&self) -> &Path;

    /// Directory containing the manifest file.
    fn project_path(&self) -> &Path {
        self.path().parent().unwrap_or(Path::new(""))
    }

    /// Project name.
    async fn name(&self) -> Result<String>;

    /// Current project version.
    async fn version(&self) -> Result<Version>;

    /// Whether the project is excluded from releases.
    async fn is_private(&self) -> Result<bool>;

    /// Prerelease identifiers of the current version, if any.
    async fn prerelease(&self) -> Result<Option<Vec<String>>> {
        let version = self.version().await?;
        Ok(prerelease_identifiers(&version))
    }

    /// Write a new version. With `dry_run` only the in-memory state changes.
    async fn write_version(
        &self,
        version: &Version,
        dry_run: bool,
    ) -> Result<VersionUpdate>;
}

/// Supported manifest file formats.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ManifestFormat {
    #[default]
    PackageJson,
    CargoToml,
}

impl ManifestFormat {
    /// File name of the manifest inside a project directory.
    pub fn filename(&self) -> &'static str {
        match self {
            ManifestFormat::PackageJson => PackageJsonManifest::FILENAME,
            ManifestFormat::CargoToml => CargoTomlManifest::FILENAME,
        }
    }

    /// Format of a manifest file, judged by its file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.file_name().and_then(|name| name.to_str()) {
            Some(PackageJsonManifest::FILENAME) => Some(ManifestFormat::PackageJson),
            Some(CargoTomlManifest::FILENAME) => Some(ManifestFormat::CargoToml),
            _ => None,
        }
    }

    /// Open a manifest of this format at the given file path.
    pub fn open(&self, path: impl Into<PathBuf>) -> Arc<dyn Manifest> {
        match self {
            ManifestFormat::PackageJson => {
                Arc::new(PackageJsonManifest::new(path))
            }
            ManifestFormat::CargoToml => Arc::new(CargoTomlManifest::new(path)),
        }
    }
}

impl Display for ManifestFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.filename())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_format_filenames() {
        assert_eq!(ManifestFormat::PackageJson.filename(), "package.json");
        assert_eq!(ManifestFormat::CargoToml.filename(), "Cargo.toml");
        assert_eq!(ManifestFormat::default(), ManifestFormat::PackageJson);
        assert_eq!(
            ManifestFormat::from_path(Path::new("crates/core/Cargo.toml")),
            Some(ManifestFormat::CargoToml)
        );
        assert_eq!(ManifestFormat::from_path(Path::new("setup.py")), None);
    }

    #[test]
    fn test_project_path_is_manifest_parent() {
        let manifest =
            ManifestFormat::CargoToml.open("crates/core/Cargo.toml");
        assert_eq!(manifest.project_path(), Path::new("crates/core"));

        let manifest = ManifestFormat::PackageJson.open("package.json");
        assert_eq!(manifest.project_path(), Path::new(""));
    }
}
