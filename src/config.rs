//! Configuration loading and parsing for `simple-release.toml` files.
//!
//! The `[project]` table describes what gets released, `[changelog]` how
//! release notes are rendered, and one table per releaser step holds that
//! step's default options.
use log::*;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    ReleaseError, Result,
    analyzer::{AnalyzerConfig, ConventionalAnalyzer},
    changelog::CHANGELOG_FILENAME,
    git::{Git2Client, GitClient},
    manifest::{ComposedManifest, Manifest, ManifestFormat},
    options::{
        BumpOptions, CheckoutOptions, CommitOptions, PublishOptions,
        PullRequestOptions, PushOptions, ReleaseOptions, StepsOptions,
        TagOptions,
    },
    project::{
        MonorepoMode, MonorepoProject, Project, Releasable, WorkspaceDiscovery,
        discovery::WorkspaceSource,
    },
    publish::{PackageManager, PackageManagerPublisher},
};

/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "simple-release.toml";

/// Monorepo settings. Their presence turns the project into a monorepo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonorepoConfig {
    pub mode: MonorepoMode,
    /// Where child project patterns come from.
    pub workspaces: WorkspaceSource,
    /// Manifest format of the children (default: the root's format).
    pub format: Option<ManifestFormat>,
}

/// What gets released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project directory relative to the config file.
    pub path: PathBuf,
    pub format: ManifestFormat,
    /// Changelog relative to the project directory.
    pub changelog_file: PathBuf,
    /// Manifests that receive the same version as the main one, relative to
    /// the project directory.
    pub extra_manifests: Vec<PathBuf>,
    /// Publish through this package manager.
    pub package_manager: Option<PackageManager>,
    pub monorepo: Option<MonorepoConfig>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            format: ManifestFormat::default(),
            changelog_file: PathBuf::from(CHANGELOG_FILENAME),
            extra_manifests: vec![],
            package_manager: None,
            monorepo: None,
        }
    }
}

/// Root configuration structure for `simple-release.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub project: ProjectConfig,
    /// Release notes rendering.
    pub changelog: AnalyzerConfig,
    pub checkout: Option<CheckoutOptions>,
    pub bump: Option<BumpOptions>,
    pub commit: Option<CommitOptions>,
    pub tag: Option<TagOptions>,
    pub push: Option<PushOptions>,
    pub publish: Option<PublishOptions>,
    pub release: Option<ReleaseOptions>,
    pub pull_request: Option<PullRequestOptions>,
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a config file. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            debug!("{} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml(&content)?;
        debug!("loaded config from {}: {config:?}", path.display());

        Ok(config)
    }

    /// Default options per releaser step.
    pub fn steps(&self) -> StepsOptions {
        StepsOptions {
            checkout: self.checkout.clone(),
            bump: self.bump.clone(),
            commit: self.commit.clone(),
            tag: self.tag.clone(),
            push: self.push.clone(),
            publish: self.publish.clone(),
            release: self.release.clone(),
            pull_request: self.pull_request.clone(),
        }
    }

    /// Build the configured project with its default collaborators. `root`
    /// is the directory the config file lives in.
    pub fn build(
        &self,
        root: &Path,
    ) -> Result<(Arc<dyn Releasable>, Arc<dyn GitClient>)> {
        let project_dir = root.join(&self.project.path);
        let git = Arc::new(Git2Client::open(&project_dir)?);
        let analyzer =
            ConventionalAnalyzer::new(git.repository(), self.changelog.clone());

        let mut builder = Project::builder()
            .manifest(self.manifest(&project_dir)?)
            .git(git.clone())
            .analyzer(Arc::new(analyzer))
            .changelog_file(self.project.changelog_file.clone());

        if let Some(manager) = self.project.package_manager {
            builder = builder.publisher(Arc::new(PackageManagerPublisher::new(manager)));
        }

        let project = builder.build()?;

        let project: Arc<dyn Releasable> = match &self.project.monorepo {
            None => Arc::new(project),
            Some(monorepo) => {
                let format = monorepo.format.unwrap_or(self.project.format);
                let discovery = WorkspaceDiscovery::new(
                    project_dir,
                    monorepo.workspaces.clone(),
                    format,
                );

                let monorepo = MonorepoProject::builder()
                    .root(project)
                    .discovery(Arc::new(discovery))
                    .mode(monorepo.mode)
                    .format(format)
                    .build()?;

                Arc::new(monorepo)
            }
        };

        let git: Arc<dyn GitClient> = git;

        Ok((project, git))
    }

    fn manifest(&self, project_dir: &Path) -> Result<Arc<dyn Manifest>> {
        let main = self
            .project
            .format
            .open(project_dir.join(self.project.format.filename()));

        if self.project.extra_manifests.is_empty() {
            return Ok(main);
        }

        let mut subordinates = vec![];

        for path in &self.project.extra_manifests {
            let format = ManifestFormat::from_path(path).ok_or_else(|| {
                ReleaseError::invalid_config(format!(
                    "unsupported manifest: {}",
                    path.display()
                ))
            })?;

            subordinates.push(format.open(project_dir.join(path)));
        }

        Ok(Arc::new(ComposedManifest::new(main, subordinates)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        options::TagsOptions,
        test_helpers::{commit_file, init_repo, write_package_json},
    };
    use semver::Version;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn loads_defaults() {
        let config = Config::from_toml("").unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.project.path, PathBuf::from("."));
        assert_eq!(config.project.changelog_file, PathBuf::from("CHANGELOG.md"));
        assert!(!config.changelog.body.is_empty());
        assert_eq!(config.steps(), StepsOptions::default());
    }

    #[test]
    fn parses_full_config() {
        let config = Config::from_toml(
            r#"
[project]
path = "app"
format = "cargo_toml"
extra_manifests = ["npm/package.json"]
package_manager = "pnpm"

[project.monorepo]
mode = "independent"
workspaces = { globs = ["crates/*", "!crates/internal"] }

[changelog]
repository_url = "https://example.com/acme/app"

[checkout]
branch = "release"
username = "bot"

[bump]
prerelease = "beta"
as = "minor"

[bump.by_project.core]
skip = true

[push]
remote = "upstream"

[pull_request]
draft = true
"#,
        )
        .unwrap();

        assert_eq!(config.project.path, PathBuf::from("app"));
        assert_eq!(config.project.format, ManifestFormat::CargoToml);
        assert_eq!(config.project.package_manager, Some(PackageManager::Pnpm));
        assert_eq!(
            config.project.monorepo,
            Some(MonorepoConfig {
                mode: MonorepoMode::Independent,
                workspaces: WorkspaceSource::Globs(vec![
                    "crates/*".into(),
                    "!crates/internal".into()
                ]),
                format: None,
            })
        );
        assert_eq!(
            config.changelog.repository_url.as_deref(),
            Some("https://example.com/acme/app")
        );

        let steps = config.steps();
        assert_eq!(
            steps.checkout.and_then(|c| c.branch).as_deref(),
            Some("release")
        );

        let bump = steps.bump.unwrap();
        assert_eq!(bump.prerelease.as_deref(), Some("beta"));
        assert!(bump.for_project("core").skip());
        assert_eq!(steps.pull_request.and_then(|p| p.draft), Some(true));
        assert!(steps.commit.is_none());
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(Config::from_toml("[push]\nremote_name = \"x\"\n").is_err());
        assert!(Config::from_toml("[unknown]\n").is_err());
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join(DEFAULT_CONFIG_FILE))
            .await
            .unwrap();

        assert_eq!(config, Config::default());
    }

    #[tokio::test]
    async fn builds_single_project() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        write_package_json(dir.path(), "widget", "1.0.0", false);
        commit_file(&repo, "README.md", "# widget\n", "feat: initial");

        fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[changelog]\nrepository_url = \"https://example.com/widget\"\n",
        )
        .unwrap();

        let config = Config::load(&dir.path().join(DEFAULT_CONFIG_FILE))
            .await
            .unwrap();
        let (project, _git) = config.build(dir.path()).unwrap();

        // no tags yet: first release keeps the manifest version
        let version = project
            .next_version(&BumpOptions::default())
            .await
            .unwrap();
        assert_eq!(version, Some(Version::new(1, 0, 0)));

        let tags = project.tags(&TagsOptions::default()).await.unwrap();
        assert_eq!(tags, vec!["v1.0.0".to_string()]);
    }

    #[tokio::test]
    async fn builds_monorepo() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        write_package_json(dir.path(), "acme", "1.0.0", true);
        write_package_json(&dir.path().join("packages/a"), "@acme/a", "1.0.0", false);

        let config = Config::from_toml(
            "[project.monorepo]\nworkspaces = { globs = [\"packages/*\"] }\n",
        )
        .unwrap();
        let (project, _git) = config.build(dir.path()).unwrap();

        let result = project.next_version(&BumpOptions::default()).await;
        assert!(matches!(result, Err(ReleaseError::MonorepoNextVersion)));
    }

    #[test]
    fn rejects_unsupported_extra_manifest() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());

        let config = Config::from_toml(
            "[project]\nextra_manifests = [\"setup.py\"]\n",
        )
        .unwrap();

        assert!(matches!(
            config.build(dir.path()),
            Err(ReleaseError::InvalidConfig(_))
        ));
    }
}
