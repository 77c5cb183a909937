//! Commit analysis: release-type classification and release-notes rendering.
//!
//! Both operations look at the commits since the last tag carrying the
//! project's tag prefix that touched the project's directory.
use async_trait::async_trait;
use futures_util::stream::BoxStream;
#[cfg(test)]
use mockall::automock;
use semver::Version;
use std::path::PathBuf;

use crate::{Result, version::ReleaseType};

/// Conventional-commit analyzer backed by libgit2 and tera.
pub mod conventional;

pub use conventional::{AnalyzerConfig, ConventionalAnalyzer, DEFAULT_BODY};

/// Lazily produced release-notes text. Chunk boundaries carry no meaning.
pub type NotesStream = BoxStream<'static, Result<String>>;

/// Which commits an analysis looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitScope {
    /// Project directory. Only commits touching it are considered.
    pub path: PathBuf,
    /// Tag prefix identifying the project's previous release.
    pub tag_prefix: String,
}

/// Classifies commits into a release type and renders release notes.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommitAnalyzer: Send + Sync {
    /// Release type implied by the commits in scope, or `None` when nothing
    /// warrants a release.
    async fn release_type(&self, scope: &CommitScope)
    -> Result<Option<ReleaseType>>;

    /// Release notes for the commits in scope, titled with `version`.
    async fn render_notes(
        &self,
        scope: &CommitScope,
        version: &Version,
    ) -> Result<NotesStream>;
}
