//! Releasable projects: single packages and monorepos.
use async_trait::async_trait;
use derive_builder::Builder;
use log::*;
#[cfg(test)]
use mockall::automock;
use semver::Version;
use serde::Serialize;
use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    ReleaseError, Result,
    analyzer::{CommitAnalyzer, CommitScope},
    changelog::{
        CHANGELOG_FILENAME, add_release_notes, collect_notes,
        extract_last_release, extract_last_release_from_file,
    },
    git::GitClient,
    manifest::{Manifest, VersionUpdate},
    options::{BumpOptions, PublishOptions, ReleaseDataOptions, TagsOptions},
    publish::{PublishRequest, Publisher},
    version::{increment, is_prerelease, resolve_release_type},
};

/// Workspace discovery for monorepo children.
pub mod discovery;
/// Monorepo with fixed or independent versioning.
pub mod monorepo;

pub use crate::analyzer::conventional::RELEASE_COMMIT_PREFIX;
pub use discovery::{ProjectDiscovery, WorkspaceDiscovery};
pub use monorepo::{
    MonorepoMode, MonorepoProject, MonorepoProjectBuilder,
    MonorepoProjectBuilderError,
};

/// Tag prefix used when none is given.
pub const DEFAULT_TAG_PREFIX: &str = "v";

/// What happened to a project during one release run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunLog {
    pub changed_files: Vec<PathBuf>,
    pub version_updates: Vec<VersionUpdate>,
}

impl RunLog {
    /// Entries recorded after `earlier` was taken.
    pub fn since(&self, earlier: &RunLog) -> RunLog {
        RunLog {
            changed_files: self
                .changed_files
                .iter()
                .skip(earlier.changed_files.len())
                .cloned()
                .collect(),
            version_updates: self
                .version_updates
                .iter()
                .skip(earlier.version_updates.len())
                .cloned()
                .collect(),
        }
    }

    pub fn extend(&mut self, other: RunLog) {
        self.changed_files.extend(other.changed_files);
        self.version_updates.extend(other.version_updates);
    }
}

/// Data for a hosted release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseData {
    pub version: String,
    pub title: String,
    pub notes: String,
    pub previous_tag: String,
    pub next_tag: String,
    pub is_prerelease: bool,
}

/// Capabilities the releaser needs from a project.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Releasable: Send + Sync {
    /// Version the next bump would produce, or `None` when there is nothing
    /// to release.
    async fn next_version(&self, options: &BumpOptions) -> Result<Option<Version>>;

    /// Write the next version and release notes. Returns false when nothing
    /// was released.
    async fn bump(&self, options: &BumpOptions) -> Result<bool>;

    /// Tags to create for the current version.
    async fn tags(&self, options: &TagsOptions) -> Result<Vec<String>>;

    async fn release_data(
        &self,
        options: &ReleaseDataOptions,
    ) -> Result<Vec<ReleaseData>>;

    /// Message for the release commit. Fails when nothing was bumped.
    fn commit_message(&self) -> Result<String>;

    async fn publish(&self, options: &PublishOptions) -> Result<()>;

    /// Snapshot of the run log.
    fn run_log(&self) -> RunLog;
}

/// A single package described by one manifest.
#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct Project {
    manifest: Arc<dyn Manifest>,
    git: Arc<dyn GitClient>,
    analyzer: Arc<dyn CommitAnalyzer>,
    #[builder(default, setter(strip_option))]
    publisher: Option<Arc<dyn Publisher>>,
    /// Changelog location relative to the project directory.
    #[builder(default = "PathBuf::from(CHANGELOG_FILENAME)", setter(into))]
    changelog_file: PathBuf,
    #[builder(setter(skip))]
    log: Mutex<RunLog>,
}

impl Project {
    pub fn builder() -> ProjectBuilder {
        ProjectBuilder::default()
    }

    pub fn manifest(&self) -> &Arc<dyn Manifest> {
        &self.manifest
    }

    pub fn changelog_path(&self) -> PathBuf {
        self.manifest.project_path().join(&self.changelog_file)
    }

    /// A project for another manifest sharing this project's collaborators.
    /// Used for monorepo children, which never publish on their own.
    pub fn sibling(&self, manifest: Arc<dyn Manifest>) -> Project {
        Project {
            manifest,
            git: Arc::clone(&self.git),
            analyzer: Arc::clone(&self.analyzer),
            publisher: None,
            changelog_file: self.changelog_file.clone(),
            log: Mutex::default(),
        }
    }

    fn log(&self) -> MutexGuard<'_, RunLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn scope(&self, options: &BumpOptions) -> CommitScope {
        CommitScope {
            path: self.manifest.project_path().to_path_buf(),
            tag_prefix: options
                .tag_prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_TAG_PREFIX.into()),
        }
    }
}

#[async_trait]
impl Releasable for Project {
    async fn next_version(&self, options: &BumpOptions) -> Result<Option<Version>> {
        if options.skip() {
            return Ok(None);
        }

        if !options.force() && self.manifest.is_private().await? {
            return Ok(None);
        }

        if let Some(version) = &options.version
            && let Ok(version) = Version::parse(version)
        {
            return Ok(Some(version));
        }

        let scope = self.scope(options);
        let first_release = match options.first_release {
            Some(first_release) => first_release,
            None => self
                .git
                .last_tag(&scope.tag_prefix, &scope.path)
                .await?
                .is_none(),
        };

        let version = self.manifest.version().await?;

        if first_release {
            return Ok(Some(version));
        }

        let release_type = match options.release_as {
            Some(release_type) => Some(release_type),
            None => self.analyzer.release_type(&scope).await?,
        };

        let Some(release_type) = release_type else {
            return Ok(None);
        };

        let prerelease = options.prerelease.as_deref();
        let release_type = resolve_release_type(release_type, &version, prerelease);

        Ok(Some(increment(&version, release_type, prerelease)?))
    }

    async fn bump(&self, options: &BumpOptions) -> Result<bool> {
        let Some(next) = self.next_version(options).await? else {
            return Ok(false);
        };

        let name = self.manifest.name().await?;
        let current = self.manifest.version().await?;
        let dry_run = options.dry_run();

        let mut update = self.manifest.write_version(&next, dry_run).await?;

        if current == next {
            info!("{name}: {next}");
        } else {
            info!("{name}: {current} -> {next}");
        }

        let notes = self.analyzer.render_notes(&self.scope(options), &next).await?;
        let changelog = self.changelog_path();

        update.notes = if dry_run {
            collect_notes(notes).await?
        } else {
            add_release_notes(&changelog, notes).await?
        };

        debug!("release notes:\n\n{}", update.notes);

        let mut log = self.log();
        log.changed_files.extend(update.files.iter().cloned());
        log.changed_files.push(changelog);
        log.version_updates.push(update);

        Ok(true)
    }

    async fn tags(&self, options: &TagsOptions) -> Result<Vec<String>> {
        let prefix = options.tag_prefix.as_deref().unwrap_or(DEFAULT_TAG_PREFIX);
        let version = self.manifest.version().await?;
        let tag = format!("{prefix}{version}");

        if options.verify() && self.git.verify_tag(&tag).await? {
            debug!("tag {tag} already exists");
            return Ok(vec![]);
        }

        Ok(vec![tag])
    }

    async fn release_data(
        &self,
        options: &ReleaseDataOptions,
    ) -> Result<Vec<ReleaseData>> {
        let version = self.manifest.version().await?;
        let last_notes = self
            .log()
            .version_updates
            .last()
            .map(|update| update.notes.clone());

        let last_release = match last_notes {
            Some(notes) => Some(extract_last_release([notes])),
            None => extract_last_release_from_file(&self.changelog_path()).await?,
        };

        let Some(mut last_release) = last_release else {
            return Ok(vec![]);
        };

        if last_release.version != version.to_string() {
            debug!(
                "changelog release '{}' does not match version {version}",
                last_release.version
            );
            return Ok(vec![]);
        }

        if last_release.next_tag.is_empty() {
            let tags = self
                .tags(&TagsOptions {
                    tag_prefix: options.tag_prefix.clone(),
                    verify: Some(false),
                })
                .await?;

            if let Some(tag) = tags.into_iter().next() {
                last_release.next_tag = tag;
            }
        }

        Ok(vec![ReleaseData {
            title: format!("v{version}"),
            version: last_release.version,
            notes: last_release.notes,
            previous_tag: last_release.previous_tag,
            next_tag: last_release.next_tag,
            is_prerelease: is_prerelease(&version),
        }])
    }

    fn commit_message(&self) -> Result<String> {
        let log = self.log();
        let first = log
            .version_updates
            .first()
            .ok_or(ReleaseError::NothingToCommit)?;

        Ok(format!("{RELEASE_COMMIT_PREFIX} {}", first.to))
    }

    async fn publish(&self, options: &PublishOptions) -> Result<()> {
        let name = self.manifest.name().await?;

        let Some(publisher) = &self.publisher else {
            return Err(ReleaseError::PublishNotConfigured(name));
        };

        let version = self.manifest.version().await?;
        let request = PublishRequest::new(
            self.manifest.project_path().to_path_buf(),
            name,
            &version,
            options,
        );

        publisher.publish(&request).await
    }

    fn run_log(&self) -> RunLog {
        self.log().clone()
    }
}
