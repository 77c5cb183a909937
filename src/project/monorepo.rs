//! Monorepo release coordination.
//!
//! In fixed mode every released package shares one version, taken from the
//! biggest bump any package needs, and the root manifest carries it too. In
//! independent mode each package is versioned and tagged on its own.
use async_trait::async_trait;
use derive_builder::Builder;
use futures_util::StreamExt;
use log::*;
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    sync::{Arc, LazyLock, Mutex, MutexGuard},
};
use tokio::sync::OnceCell;

use crate::{
    ReleaseError, Result,
    manifest::ManifestFormat,
    options::{BumpOptions, PublishOptions, ReleaseDataOptions, TagsOptions},
    project::{
        Project, RELEASE_COMMIT_PREFIX, Releasable, ReleaseData, RunLog,
        discovery::ProjectDiscovery,
    },
};

static ORG_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@[^/]+/").unwrap());

/// Maps a package name and the root package name to a scope.
pub type ScopeResolver = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

/// Maps a scope to a tag prefix.
pub type TagPrefixResolver = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Versioning policy of a monorepo.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MonorepoMode {
    /// All packages share one version.
    #[default]
    Fixed,
    /// Each package has its own version.
    Independent,
}

impl Display for MonorepoMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonorepoMode::Fixed => f.write_str("fixed"),
            MonorepoMode::Independent => f.write_str("independent"),
        }
    }
}

/// A root project plus child projects found through a discovery
/// collaborator.
#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct MonorepoProject {
    /// Project of the root manifest. Its collaborators are shared with the
    /// children.
    root: Project,
    discovery: Arc<dyn ProjectDiscovery>,
    #[builder(default)]
    mode: MonorepoMode,
    /// Manifest format of the children.
    #[builder(default)]
    format: ManifestFormat,
    #[builder(default, setter(strip_option))]
    scope: Option<ScopeResolver>,
    #[builder(default, setter(strip_option))]
    tag_prefix: Option<TagPrefixResolver>,
    #[builder(setter(skip))]
    projects: OnceCell<Vec<Arc<Project>>>,
    #[builder(setter(skip))]
    log: Mutex<RunLog>,
}

impl MonorepoProject {
    pub fn builder() -> MonorepoProjectBuilder {
        MonorepoProjectBuilder::default()
    }

    pub fn mode(&self) -> MonorepoMode {
        self.mode
    }

    pub fn root(&self) -> &Project {
        &self.root
    }

    /// Non-private child projects in discovery order. Discovery runs once per
    /// monorepo; concurrent callers wait for the same result.
    pub async fn projects(&self) -> Result<&[Arc<Project>]> {
        let projects = self
            .projects
            .get_or_try_init(|| self.discover_projects())
            .await?;

        Ok(projects.as_slice())
    }

    async fn discover_projects(&self) -> Result<Vec<Arc<Project>>> {
        let root_path = self.root.manifest().project_path().to_path_buf();
        let mut found = self.discovery.projects();
        let mut projects = vec![];

        while let Some(dir) = found.next().await {
            let dir = dir?;
            let dir = if dir.is_absolute() {
                dir
            } else {
                root_path.join(dir)
            };

            let manifest = self.format.open(dir.join(self.format.filename()));

            if manifest.is_private().await? {
                debug!("skipping private project: {}", dir.display());
                continue;
            }

            projects.push(Arc::new(self.root.sibling(manifest)));
        }

        info!("found {} projects in {} monorepo", projects.len(), self.mode);

        Ok(projects)
    }

    /// Scope of a package: the custom resolver's answer, otherwise the name
    /// without its `@org/` prefix.
    pub async fn scope(&self, name: &str) -> Result<String> {
        match &self.scope {
            Some(resolve) => {
                let root_name = self.root.manifest().name().await?;
                Ok(resolve(name, &root_name))
            }
            None => Ok(ORG_PREFIX.replace(name, "").into_owned()),
        }
    }

    pub fn tag_prefix(&self, scope: &str) -> String {
        if let Some(resolve) = &self.tag_prefix {
            return resolve(scope);
        }

        match self.mode {
            MonorepoMode::Fixed => String::new(),
            MonorepoMode::Independent => format!("{scope}@"),
        }
    }

    async fn child_tag_prefix(&self, project: &Project) -> Result<String> {
        let name = project.manifest().name().await?;
        let scope = self.scope(&name).await?;
        Ok(self.tag_prefix(&scope))
    }

    async fn child_options(
        &self,
        project: &Project,
        options: &BumpOptions,
    ) -> Result<BumpOptions> {
        let name = project.manifest().name().await?;

        Ok(BumpOptions {
            tag_prefix: Some(self.child_tag_prefix(project).await?),
            ..options.for_project(&name)
        })
    }

    fn log(&self) -> MutexGuard<'_, RunLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bump `project` and copy the entries it added to its run log.
    async fn bump_child(
        &self,
        project: &Project,
        options: &BumpOptions,
    ) -> Result<bool> {
        let before = project.run_log();
        let bumped = project.bump(options).await?;
        let added = project.run_log().since(&before);
        self.log().extend(added);
        Ok(bumped)
    }

    async fn fixed_bump(&self, options: &BumpOptions) -> Result<bool> {
        let mut candidates = vec![];
        let mut fixed_version: Option<Version> = None;

        for project in self.projects().await? {
            let child_options = self.child_options(project, options).await?;
            let version = project.next_version(&child_options).await?;

            if version.is_none() && !options.force() {
                continue;
            }

            if let Some(version) = version
                && fixed_version.as_ref().is_none_or(|fixed| version > *fixed)
            {
                fixed_version = Some(version);
            }

            candidates.push((project, child_options));
        }

        let Some(fixed_version) = fixed_version else {
            info!("no version changes in monorepo projects");
            return Ok(false);
        };

        info!("fixed version: {fixed_version}");

        let root_options = BumpOptions {
            version: Some(fixed_version.to_string()),
            force: Some(true),
            tag_prefix: Some(self.tag_prefix("")),
            by_project: None,
            ..options.clone()
        };

        let mut bumped = self.bump_child(&self.root, &root_options).await?;

        for (project, child_options) in candidates {
            let child_options = BumpOptions {
                version: Some(fixed_version.to_string()),
                ..child_options
            };

            bumped = self.bump_child(project, &child_options).await? || bumped;
        }

        Ok(bumped)
    }

    async fn independent_bump(&self, options: &BumpOptions) -> Result<bool> {
        let mut bumped = false;

        for project in self.projects().await? {
            let child_options = self.child_options(project, options).await?;
            bumped = self.bump_child(project, &child_options).await? || bumped;
        }

        Ok(bumped)
    }
}

#[async_trait]
impl Releasable for MonorepoProject {
    async fn next_version(&self, options: &BumpOptions) -> Result<Option<Version>> {
        if self.mode == MonorepoMode::Fixed && options.version.is_some() {
            return self.root.next_version(options).await;
        }

        Err(ReleaseError::MonorepoNextVersion)
    }

    async fn bump(&self, options: &BumpOptions) -> Result<bool> {
        match self.mode {
            MonorepoMode::Fixed => self.fixed_bump(options).await,
            MonorepoMode::Independent => self.independent_bump(options).await,
        }
    }

    async fn tags(&self, options: &TagsOptions) -> Result<Vec<String>> {
        if self.mode == MonorepoMode::Fixed {
            return self.root.tags(options).await;
        }

        let mut tags = vec![];

        for project in self.projects().await? {
            let child_options = TagsOptions {
                tag_prefix: Some(self.child_tag_prefix(project).await?),
                ..options.clone()
            };

            tags.extend(project.tags(&child_options).await?);
        }

        Ok(tags)
    }

    async fn release_data(
        &self,
        options: &ReleaseDataOptions,
    ) -> Result<Vec<ReleaseData>> {
        if self.mode == MonorepoMode::Fixed {
            return self.root.release_data(options).await;
        }

        let mut data = vec![];

        for project in self.projects().await? {
            let name = project.manifest().name().await?;
            let child_options = ReleaseDataOptions {
                tag_prefix: Some(self.child_tag_prefix(project).await?),
            };

            data.extend(
                project
                    .release_data(&child_options)
                    .await?
                    .into_iter()
                    .map(|release| ReleaseData {
                        title: format!("{name}: {}", release.title),
                        ..release
                    }),
            );
        }

        Ok(data)
    }

    fn commit_message(&self) -> Result<String> {
        let log = self.log();

        if log.version_updates.is_empty() {
            return Err(ReleaseError::NothingToCommit);
        }

        if self.mode == MonorepoMode::Fixed {
            return Ok(format!(
                "{RELEASE_COMMIT_PREFIX} {}",
                log.version_updates[0].to
            ));
        }

        let bullets = log
            .version_updates
            .iter()
            .map(|update| format!("- {}@{}", update.name, update.to))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(format!("{RELEASE_COMMIT_PREFIX} monorepo release\n\n{bullets}"))
    }

    async fn publish(&self, options: &PublishOptions) -> Result<()> {
        let options = PublishOptions {
            workspaces: options.workspaces.or(Some(true)),
            ..options.clone()
        };

        self.root.publish(&options).await
    }

    fn run_log(&self) -> RunLog {
        self.log().clone()
    }
}

#[cfg(test)]
#[path = "./monorepo_tests.rs"]
mod tests;
