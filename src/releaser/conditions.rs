use async_trait::async_trait;
use log::*;

use crate::{
    Result,
    options::TagsOptions,
    project::RELEASE_COMMIT_PREFIX,
    releaser::{Condition, Releaser},
};

/// Holds when HEAD is a release commit whose version is not tagged yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct IfReleaseCommit;

#[async_trait]
impl Condition for IfReleaseCommit {
    async fn check(&self, releaser: &Releaser) -> Result<bool> {
        let message = releaser.git().last_commit_message().await?;

        if !message.starts_with(RELEASE_COMMIT_PREFIX) {
            debug!("last commit is not a release commit");
            return Ok(false);
        }

        let tags = releaser.project().tags(&TagsOptions::default()).await?;

        Ok(!tags.is_empty())
    }
}
