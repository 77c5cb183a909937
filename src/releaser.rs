//! Release pipeline.
//!
//! Builder methods queue [`Step`]s; [`Releaser::run`] executes them in order
//! against one project. Steps share a [`ReleaserState`] so later steps can
//! skip work when earlier steps changed nothing.
use async_trait::async_trait;
use log::*;
#[cfg(test)]
use mockall::automock;
use merge::Merge;
use std::sync::Arc;

use crate::{
    ReleaseError, Result,
    git::{CommitParams, DEFAULT_REMOTE, FetchParams, GitClient, PushParams, TagParams},
    hosting::{Hosting, PullRequestRequest},
    options::{
        BumpOptions, CheckoutOptions, CommitOptions, PublishOptions,
        PullRequestOptions, PushOptions, ReleaseDataOptions, ReleaseOptions,
        StepsOptions, TagOptions, TagsOptions, layered,
    },
    project::Releasable,
};

/// Run conditions.
pub mod conditions;

pub use conditions::IfReleaseCommit;

/// Release branch used by the checkout step when none is given.
pub const DEFAULT_RELEASE_BRANCH: &str = "simple-release";

/// A queued pipeline step with its invocation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Checkout {
        branch: Option<String>,
        options: CheckoutOptions,
    },
    Bump(BumpOptions),
    Commit(CommitOptions),
    Tag(TagOptions),
    Push(PushOptions),
    Publish(PublishOptions),
    Release(ReleaseOptions),
    PullRequest(PullRequestOptions),
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Checkout { .. } => "checkout",
            Step::Bump(_) => "bump",
            Step::Commit(_) => "commit",
            Step::Tag(_) => "tag",
            Step::Push(_) => "push",
            Step::Publish(_) => "publish",
            Step::Release(_) => "release",
            Step::PullRequest(_) => "pull_request",
        }
    }

    fn needs_hosting(&self) -> bool {
        matches!(self, Step::Release(_) | Step::PullRequest(_))
    }
}

/// State shared between the steps of a run. Each field is written by one
/// step: branches by checkout, `bump` by bump, `tags` by tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaserState {
    pub head_branch: Option<String>,
    pub base_branch: Option<String>,
    pub bump: bool,
    pub tags: bool,
}

/// Predicate deciding whether the queued steps run at all.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Condition: Send + Sync {
    async fn check(&self, releaser: &Releaser) -> Result<bool>;
}

/// Ordered release pipeline for one project.
pub struct Releaser {
    project: Arc<dyn Releasable>,
    git: Arc<dyn GitClient>,
    hosting: Option<Arc<dyn Hosting>>,
    dry_run: bool,
    steps: StepsOptions,
    queue: Vec<Step>,
    state: ReleaserState,
}

impl Releaser {
    pub fn new(project: Arc<dyn Releasable>, git: Arc<dyn GitClient>) -> Self {
        Self {
            project,
            git,
            hosting: None,
            dry_run: false,
            steps: StepsOptions::default(),
            queue: vec![],
            state: ReleaserState::default(),
        }
    }

    pub fn with_hosting(mut self, hosting: Arc<dyn Hosting>) -> Self {
        self.hosting = Some(hosting);
        self
    }

    /// Skip git, hosting and registry side effects. Files are left untouched
    /// too.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn project(&self) -> &Arc<dyn Releasable> {
        &self.project
    }

    pub fn git(&self) -> &Arc<dyn GitClient> {
        &self.git
    }

    pub fn state(&self) -> &ReleaserState {
        &self.state
    }

    /// Steps waiting for the next run.
    pub fn queue(&self) -> &[Step] {
        &self.queue
    }

    pub fn step_options(&self) -> &StepsOptions {
        &self.steps
    }

    /// Merge default options per step. Values set here override values from
    /// earlier calls, field by field.
    pub fn set_options(&mut self, options: StepsOptions) -> &mut Self {
        let mut merged = options;
        merged.merge(std::mem::take(&mut self.steps));
        self.steps = merged;

        debug!("step options: {:?}", self.steps);
        self
    }

    pub fn checkout(
        &mut self,
        branch: Option<String>,
        options: CheckoutOptions,
    ) -> &mut Self {
        self.enqueue(Step::Checkout { branch, options })
    }

    pub fn bump(&mut self, options: BumpOptions) -> &mut Self {
        self.enqueue(Step::Bump(options))
    }

    pub fn commit(&mut self, options: CommitOptions) -> &mut Self {
        self.enqueue(Step::Commit(options))
    }

    pub fn tag(&mut self, options: TagOptions) -> &mut Self {
        self.enqueue(Step::Tag(options))
    }

    pub fn push(&mut self, options: PushOptions) -> &mut Self {
        self.enqueue(Step::Push(options))
    }

    pub fn publish(&mut self, options: PublishOptions) -> &mut Self {
        self.enqueue(Step::Publish(options))
    }

    pub fn release(&mut self, options: ReleaseOptions) -> &mut Self {
        self.enqueue(Step::Release(options))
    }

    pub fn pull_request(&mut self, options: PullRequestOptions) -> &mut Self {
        self.enqueue(Step::PullRequest(options))
    }

    fn enqueue(&mut self, step: Step) -> &mut Self {
        self.queue.push(step);
        self
    }

    /// Run every queued step in order. The queue is emptied even when a step
    /// fails.
    pub async fn run(&mut self) -> Result<()> {
        self.execute(None).await
    }

    /// Like [`Releaser::run`], but skip the queued steps when `condition`
    /// does not hold.
    pub async fn run_if(&mut self, condition: &dyn Condition) -> Result<()> {
        self.execute(Some(condition)).await
    }

    async fn execute(&mut self, condition: Option<&dyn Condition>) -> Result<()> {
        let queue = std::mem::take(&mut self.queue);

        if self.hosting.is_none()
            && let Some(step) = queue.iter().find(|step| step.needs_hosting())
        {
            return Err(ReleaseError::HostingNotConfigured(step.name()));
        }

        if let Some(condition) = condition {
            info!("checking run condition");

            if !condition.check(self).await? {
                info!("condition failed, skipping release steps");
                return Ok(());
            }

            info!("condition passed, running release steps");
        }

        for step in queue {
            self.execute_step(step).await?;
        }

        info!("done");

        Ok(())
    }

    async fn execute_step(&mut self, step: Step) -> Result<()> {
        let name = step.name();
        debug!("running step: {name}");

        match step {
            Step::Checkout { branch, options } => {
                self.run_checkout(branch, options).await
            }
            Step::Bump(options) => self.run_bump(options).await,
            Step::Commit(options) => self.run_commit(options).await,
            Step::Tag(options) => self.run_tag(options).await,
            Step::Push(options) => self.run_push(options).await,
            Step::Publish(options) => self.run_publish(options).await,
            Step::Release(options) => self.run_release(options).await,
            Step::PullRequest(options) => self.run_pull_request(options).await,
        }
    }

    fn hosting(&self, step: &'static str) -> Result<Arc<dyn Hosting>> {
        self.hosting
            .clone()
            .ok_or(ReleaseError::HostingNotConfigured(step))
    }

    fn dry_run_marker(&self) -> &'static str {
        if self.dry_run { "[dry-run] " } else { "" }
    }

    async fn base_branch(&self) -> Result<String> {
        match &self.state.base_branch {
            Some(branch) => Ok(branch.clone()),
            None => self.git.current_branch().await,
        }
    }

    async fn run_checkout(
        &mut self,
        branch: Option<String>,
        options: CheckoutOptions,
    ) -> Result<()> {
        let options = layered(Some(options), self.steps.checkout.clone());
        let head = branch
            .or(options.branch)
            .unwrap_or_else(|| DEFAULT_RELEASE_BRANCH.into());
        let marker = self.dry_run_marker();

        info!("{marker}checking out branch {head}");

        let base = self.base_branch().await?;
        self.state.head_branch = Some(head.clone());
        self.state.base_branch = Some(base);

        if let Some(username) = &options.username {
            debug!("{marker}setting git user.name to \"{username}\"");
            if !self.dry_run {
                self.git.set_config("user.name", username).await?;
            }
        }

        if let Some(email) = &options.email {
            debug!("{marker}setting git user.email to \"{email}\"");
            if !self.dry_run {
                self.git.set_config("user.email", email).await?;
            }
        }

        if options.fetch.unwrap_or(false) {
            debug!("{marker}fetching all commits and tags");
            if !self.dry_run {
                self.git
                    .fetch(FetchParams {
                        remote: DEFAULT_REMOTE.into(),
                        prune: true,
                        unshallow: true,
                        tags: true,
                    })
                    .await?;
            }
        }

        if options.force.unwrap_or(false) {
            debug!("{marker}deleting branch {head} if it exists");
            if !self.dry_run
                && let Err(err) = self.git.delete_branch(&head).await
            {
                warn!("branch {head} not deleted: {err}");
            }
        }

        if self.dry_run {
            return Ok(());
        }

        if let Err(err) = self.git.create_branch(&head).await {
            debug!("branch {head} not created ({err}), checking it out");
            self.git.checkout(&head).await?;
        }

        Ok(())
    }

    async fn run_bump(&mut self, options: BumpOptions) -> Result<()> {
        let options = BumpOptions {
            dry_run: Some(self.dry_run),
            ..layered(Some(options), self.steps.bump.clone())
        };

        info!("{}bumping version", self.dry_run_marker());

        self.state.bump = self.project.bump(&options).await?;

        if !self.state.bump {
            info!("no version changes detected");
        }

        Ok(())
    }

    async fn run_commit(&mut self, options: CommitOptions) -> Result<()> {
        if !self.state.bump {
            info!("no changes to commit");
            return Ok(());
        }

        let options = layered(Some(options), self.steps.commit.clone());
        let files = self.project.run_log().changed_files;
        let params = CommitParams {
            message: self.project.commit_message()?,
            verify: false,
            amend: options.amend.unwrap_or(false),
        };

        info!("{}committing changes", self.dry_run_marker());
        debug!("files to commit:");
        for file in &files {
            debug!("- {}", file.display());
        }
        debug!("commit message:\n\n{}\n", params.message);

        if !self.dry_run {
            self.git.add(&files).await?;
            self.git.commit(params).await?;
        }

        Ok(())
    }

    async fn run_tag(&mut self, options: TagOptions) -> Result<()> {
        let options = layered(Some(options), self.steps.tag.clone());
        let marker = self.dry_run_marker();

        if options.fetch.unwrap_or(false) && !self.dry_run {
            debug!("fetching remote tags");
            self.git
                .fetch(FetchParams {
                    remote: DEFAULT_REMOTE.into(),
                    tags: true,
                    ..Default::default()
                })
                .await?;
        }

        let tags = self.project.tags(&TagsOptions::default()).await?;
        self.state.tags = !tags.is_empty();

        if !self.state.tags {
            info!("no tags to create");
            return Ok(());
        }

        info!("{marker}tagging version");

        for tag in tags {
            debug!("- {tag}");

            if !self.dry_run {
                self.git
                    .create_tag(TagParams {
                        name: tag,
                        message: options.message.clone(),
                    })
                    .await?;
            }
        }

        Ok(())
    }

    async fn run_push(&mut self, options: PushOptions) -> Result<()> {
        if !self.state.bump && !self.state.tags {
            info!("nothing to push");
            return Ok(());
        }

        let options = layered(Some(options), self.steps.push.clone());
        let branch = self.git.current_branch().await?;

        info!("{}pushing changes to {branch}", self.dry_run_marker());

        if self.dry_run {
            return Ok(());
        }

        if self.state.bump {
            self.git
                .push(
                    &branch,
                    PushParams {
                        remote: options.remote.clone(),
                        force: options.force.unwrap_or(false),
                        tags: false,
                        verify: false,
                    },
                )
                .await?;
        }

        if self.state.tags {
            self.git
                .push(
                    &branch,
                    PushParams {
                        remote: options.remote,
                        force: false,
                        tags: true,
                        verify: false,
                    },
                )
                .await?;
        }

        Ok(())
    }

    async fn run_publish(&mut self, options: PublishOptions) -> Result<()> {
        let options = PublishOptions {
            dry_run: Some(self.dry_run),
            ..layered(Some(options), self.steps.publish.clone())
        };

        info!("{}publishing", self.dry_run_marker());

        self.project.publish(&options).await
    }

    async fn run_release(&mut self, options: ReleaseOptions) -> Result<()> {
        let hosting = self.hosting("release")?;
        let options = layered(Some(options), self.steps.release.clone());
        let marker = self.dry_run_marker();

        let releases = self
            .project
            .release_data(&ReleaseDataOptions::default())
            .await?;

        if releases.is_empty() {
            info!("no releases to create");
        }

        for release in releases {
            if hosting.has_release(&release.next_tag).await? {
                info!("release {} already exists, skipping", release.next_tag);
                continue;
            }

            info!("{marker}creating release {}", release.title);

            if !self.dry_run {
                hosting.create_release(&release, &options).await?;
            }
        }

        Ok(())
    }

    async fn run_pull_request(
        &mut self,
        options: PullRequestOptions,
    ) -> Result<()> {
        let hosting = self.hosting("pull_request")?;

        if !self.state.bump {
            info!("no version changes, skipping pull request");
            return Ok(());
        }

        let Some(head) = self.state.head_branch.clone() else {
            info!("head branch is not set, skipping pull request");
            return Ok(());
        };

        let options = layered(Some(options), self.steps.pull_request.clone());
        let from = options.from.unwrap_or(head);
        let to = match options.to {
            Some(to) => to,
            None => self.base_branch().await?,
        };

        if from == to {
            return Err(ReleaseError::SameBranch(from));
        }

        let message = self.project.commit_message()?;
        let title = message.lines().next().unwrap_or_default().to_string();
        let body = self
            .project
            .run_log()
            .version_updates
            .iter()
            .map(|update| format!("# {}\n\n{}", update.name, update.notes.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");

        info!(
            "{}creating pull request {from} -> {to}",
            self.dry_run_marker()
        );

        if self.dry_run {
            return Ok(());
        }

        hosting
            .create_pull_request(&PullRequestRequest {
                from,
                to,
                title,
                body,
                draft: options.draft.unwrap_or(false),
            })
            .await
    }
}
