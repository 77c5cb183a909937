//! Git collaborator used by projects and the releaser.
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::path::{Path, PathBuf};

use crate::Result;

/// libgit2-backed [`GitClient`] implementation.
pub mod repository;

pub use repository::Git2Client;

/// Default remote used for fetch and push.
pub const DEFAULT_REMOTE: &str = "origin";

/// Parameters for creating a tag at HEAD.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagParams {
    pub name: String,
    /// Annotation message. `None` creates a lightweight tag.
    pub message: Option<String>,
}

/// Parameters for committing the staged index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitParams {
    pub message: String,
    /// Run commit hooks.
    pub verify: bool,
    /// Amend HEAD instead of creating a new commit.
    pub amend: bool,
}

/// Parameters for pushing a branch or tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushParams {
    pub remote: Option<String>,
    pub force: bool,
    /// Push tags instead of the branch.
    pub tags: bool,
    /// Run push hooks.
    pub verify: bool,
}

/// Parameters for fetching from a remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchParams {
    pub remote: String,
    pub prune: bool,
    pub unshallow: bool,
    pub tags: bool,
}

/// Git operations needed to run a release.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Newest semver tag with the given prefix reachable from HEAD, counting
    /// only tags on commits that touch `path`.
    async fn last_tag(&self, prefix: &str, path: &Path) -> Result<Option<String>>;

    /// Whether a tag with this exact name exists.
    async fn verify_tag(&self, name: &str) -> Result<bool>;

    async fn create_tag(&self, params: TagParams) -> Result<()>;

    /// Stage the given files. Files that no longer exist are removed from
    /// the index.
    async fn add(&self, files: &[PathBuf]) -> Result<()>;

    async fn commit(&self, params: CommitParams) -> Result<()>;

    async fn push(&self, branch: &str, params: PushParams) -> Result<()>;

    async fn current_branch(&self) -> Result<String>;

    async fn default_branch(&self) -> Result<String>;

    async fn fetch(&self, params: FetchParams) -> Result<()>;

    async fn checkout(&self, branch: &str) -> Result<()>;

    /// Create a branch at HEAD and check it out. Fails when it exists.
    async fn create_branch(&self, branch: &str) -> Result<()>;

    async fn delete_branch(&self, branch: &str) -> Result<()>;

    async fn get_config(&self, key: &str) -> Result<Option<String>>;

    async fn set_config(&self, key: &str, value: &str) -> Result<()>;

    /// Full message of the HEAD commit.
    async fn last_commit_message(&self) -> Result<String>;
}
