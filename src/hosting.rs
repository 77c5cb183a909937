//! Hosting service collaborator: releases and pull requests.
//!
//! No network client ships with the crate. Integrations implement [`Hosting`]
//! and hand it to the releaser.
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::{Result, options::ReleaseOptions, project::ReleaseData};

/// Request for opening a pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestRequest {
    /// Source branch.
    pub from: String,
    /// Target branch.
    pub to: String,
    pub title: String,
    pub body: String,
    pub draft: bool,
}

/// Creates hosted releases and pull requests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Hosting: Send + Sync {
    /// Whether a release already exists for the tag.
    async fn has_release(&self, tag: &str) -> Result<bool>;

    async fn create_release(
        &self,
        data: &ReleaseData,
        options: &ReleaseOptions,
    ) -> Result<()>;

    async fn create_pull_request(&self, request: &PullRequestRequest)
    -> Result<()>;
}
