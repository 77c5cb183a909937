use async_trait::async_trait;
use color_eyre::eyre::{OptionExt, eyre};
use git2::{
    AutotagOption, BranchType, Cred, CredentialType, ErrorCode, FetchOptions,
    FetchPrune, Oid, PushOptions, RemoteCallbacks, Sort,
};
use log::*;
use regex::Regex;
use semver::Version;
use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;

use crate::{
    Result,
    git::{
        CommitParams, DEFAULT_REMOTE, FetchParams, GitClient, PushParams,
        TagParams,
    },
};

/// Git client operating on a local repository through libgit2.
///
/// libgit2 never runs git hooks, so the `verify` flags of commit and push
/// parameters have no effect here.
pub struct Git2Client {
    repo: Arc<Mutex<git2::Repository>>,
}

impl Git2Client {
    /// Open the repository containing `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let repo = git2::Repository::discover(path)?;
        Ok(Self::from_repository(repo))
    }

    pub fn from_repository(repo: git2::Repository) -> Self {
        Self {
            repo: Arc::new(Mutex::new(repo)),
        }
    }

    /// Shared handle to the underlying repository.
    pub fn repository(&self) -> Arc<Mutex<git2::Repository>> {
        Arc::clone(&self.repo)
    }
}

/// Credentials from the ssh agent or the configured git credential helper.
fn remote_callbacks<'a>(config: git2::Config) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();

    callbacks.credentials(move |url, username, allowed| {
        if allowed.contains(CredentialType::SSH_KEY)
            && let Some(username) = username
        {
            return Cred::ssh_key_from_agent(username);
        }

        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            return Cred::credential_helper(&config, url, username);
        }

        Cred::default()
    });

    callbacks.push_update_reference(|reference, status| match status {
        Some(message) => Err(git2::Error::from_str(&format!(
            "remote rejected {reference}: {message}"
        ))),
        None => Ok(()),
    });

    callbacks
}

/// Whether `commit` changes anything under `scope`, a path relative to the
/// work tree. An empty scope matches every commit.
pub(crate) fn commit_touches(
    repo: &git2::Repository,
    commit: &git2::Commit,
    scope: &Path,
) -> Result<bool> {
    if scope.as_os_str().is_empty() {
        return Ok(true);
    }

    let tree = commit.tree()?;
    let parent_tree = match commit.parent(0) {
        Ok(parent) => Some(parent.tree()?),
        Err(_) => None,
    };

    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

    let touched = diff.deltas().any(|delta| {
        [delta.new_file().path(), delta.old_file().path()]
            .into_iter()
            .flatten()
            .any(|path| path.starts_with(scope))
    });

    Ok(touched)
}

/// Newest semver tag with `prefix` reachable from HEAD, with the commit it
/// points to. An empty prefix also accepts a leading `v`. With a `scope`,
/// tags on commits that do not touch it are passed over.
pub(crate) fn find_last_tag(
    repo: &git2::Repository,
    prefix: &str,
    scope: Option<&Path>,
) -> Result<Option<(String, Oid)>> {
    let optional_v = if prefix.is_empty() { "v?" } else { "" };
    let pattern = Regex::new(&format!(
        r"^{}{}(\d+\.\d+\.\d+\S*)$",
        regex::escape(prefix),
        optional_v
    ))?;

    let mut tagged: HashMap<Oid, Vec<(Version, String)>> = HashMap::new();

    for reference in repo.references()?.filter_map(|r| r.ok()) {
        if reference.is_tag()
            && let Some(name) = reference.name()
            && let Some(stripped) = name.strip_prefix("refs/tags/")
            && let Some(captures) = pattern.captures(stripped)
            && let Ok(version) = Version::parse(&captures[1])
        {
            let commit = reference.peel_to_commit()?;
            tagged
                .entry(commit.id())
                .or_default()
                .push((version, stripped.to_string()));
        }
    }

    if tagged.is_empty() || repo.head().is_err() {
        return Ok(None);
    }

    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
    revwalk.push_head()?;

    for oid in revwalk {
        let oid = oid?;

        let Some(tags) = tagged.remove(&oid) else {
            continue;
        };

        if let Some(scope) = scope
            && !commit_touches(repo, &repo.find_commit(oid)?, scope)?
        {
            continue;
        }

        if let Some((_, name)) = tags.into_iter().max_by(|a, b| a.0.cmp(&b.0)) {
            return Ok(Some((name, oid)));
        }
    }

    Ok(None)
}

/// Convert a path relative to the current directory (or absolute) into a
/// path relative to the repository work tree.
pub(crate) fn repo_relative(
    repo: &git2::Repository,
    path: &Path,
) -> Result<PathBuf> {
    let workdir = repo
        .workdir()
        .ok_or_eyre("bare repositories are not supported")?;

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };

    if let Ok(relative) = absolute.strip_prefix(workdir) {
        return Ok(relative.to_path_buf());
    }

    // symlinked temp dirs and the like
    let workdir = workdir.canonicalize()?;
    let absolute = match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(file_name)) if parent.exists() => {
            parent.canonicalize()?.join(file_name)
        }
        _ => absolute.clone(),
    };

    absolute
        .strip_prefix(&workdir)
        .map(Path::to_path_buf)
        .map_err(|_| {
            eyre!(
                "{} is outside of the repository {}",
                absolute.display(),
                workdir.display()
            )
            .into()
        })
}

#[async_trait]
impl GitClient for Git2Client {
    async fn last_tag(&self, prefix: &str, path: &Path) -> Result<Option<String>> {
        let repo = self.repo.lock().await;
        let scope = repo_relative(&repo, path)?;
        Ok(find_last_tag(&repo, prefix, Some(&scope))?.map(|(name, _)| name))
    }

    async fn verify_tag(&self, name: &str) -> Result<bool> {
        let repo = self.repo.lock().await;
        let exists = repo.find_reference(&format!("refs/tags/{name}")).is_ok();
        Ok(exists)
    }

    async fn create_tag(&self, params: TagParams) -> Result<()> {
        let repo = self.repo.lock().await;
        let target = repo.head()?.peel(git2::ObjectType::Commit)?;

        match params.message {
            Some(message) => {
                let tagger = repo.signature()?;
                repo.tag(&params.name, &target, &tagger, &message, false)?;
            }
            None => {
                repo.tag_lightweight(&params.name, &target, false)?;
            }
        }

        debug!("created tag {}", params.name);

        Ok(())
    }

    async fn add(&self, files: &[PathBuf]) -> Result<()> {
        let repo = self.repo.lock().await;
        let mut index = repo.index()?;
        index.read(false)?;

        for file in files {
            let relative = repo_relative(&repo, file)?;

            if file.exists() {
                index.add_path(&relative)?;
            } else {
                index.remove_path(&relative)?;
            }
        }

        index.write()?;

        Ok(())
    }

    async fn commit(&self, params: CommitParams) -> Result<()> {
        let repo = self.repo.lock().await;
        let signature = repo.signature()?;
        let mut index = repo.index()?;
        index.read(false)?;
        let tree = repo.find_tree(index.write_tree()?)?;
        let head = repo.head().ok().and_then(|h| h.peel_to_commit().ok());

        debug!(
            "committing: amend: {}, verify: {}",
            params.amend, params.verify
        );

        match head {
            Some(head) if params.amend => {
                head.amend(
                    Some("HEAD"),
                    None,
                    Some(&signature),
                    None,
                    Some(&params.message),
                    Some(&tree),
                )?;
            }
            Some(head) => {
                repo.commit(
                    Some("HEAD"),
                    &signature,
                    &signature,
                    &params.message,
                    &tree,
                    &[&head],
                )?;
            }
            None => {
                repo.commit(
                    Some("HEAD"),
                    &signature,
                    &signature,
                    &params.message,
                    &tree,
                    &[],
                )?;
            }
        }

        Ok(())
    }

    async fn push(&self, branch: &str, params: PushParams) -> Result<()> {
        let repo = self.repo.lock().await;
        let remote_name = params.remote.as_deref().unwrap_or(DEFAULT_REMOTE);
        let mut remote = repo.find_remote(remote_name)?;
        let force = if params.force { "+" } else { "" };

        let refspecs: Vec<String> = if params.tags {
            repo.tag_names(None)?
                .iter()
                .flatten()
                .map(|tag| format!("{force}refs/tags/{tag}:refs/tags/{tag}"))
                .collect()
        } else {
            vec![format!("{force}refs/heads/{branch}:refs/heads/{branch}")]
        };

        info!(
            "pushing {} to {remote_name}",
            if params.tags { "tags" } else { branch }
        );

        let mut push_options = PushOptions::new();
        push_options.remote_callbacks(remote_callbacks(repo.config()?));
        remote.push(&refspecs, Some(&mut push_options))?;

        Ok(())
    }

    async fn current_branch(&self) -> Result<String> {
        let repo = self.repo.lock().await;
        let head = repo.head()?;
        let branch = head
            .shorthand()
            .ok_or_eyre("unable to get current branch")?
            .to_string();
        Ok(branch)
    }

    async fn default_branch(&self) -> Result<String> {
        let repo = self.repo.lock().await;
        let remote_head = format!("refs/remotes/{DEFAULT_REMOTE}/HEAD");

        if let Ok(reference) = repo.find_reference(&remote_head)
            && let Some(target) = reference.symbolic_target()
            && let Some(branch) = target
                .strip_prefix(&format!("refs/remotes/{DEFAULT_REMOTE}/"))
        {
            return Ok(branch.to_string());
        }

        for candidate in ["main", "master"] {
            if repo.find_branch(candidate, BranchType::Local).is_ok() {
                return Ok(candidate.to_string());
            }
        }

        let head = repo.head()?;
        let branch = head
            .shorthand()
            .ok_or_eyre("unable to determine default branch")?
            .to_string();
        Ok(branch)
    }

    async fn fetch(&self, params: FetchParams) -> Result<()> {
        let repo = self.repo.lock().await;
        let mut remote = repo.find_remote(&params.remote)?;
        let mut fetch_options = FetchOptions::new();

        fetch_options.remote_callbacks(remote_callbacks(repo.config()?));

        if params.prune {
            fetch_options.prune(FetchPrune::On);
        }

        if params.tags {
            fetch_options.download_tags(AutotagOption::All);
        }

        if params.unshallow && repo.is_shallow() {
            fetch_options.depth(i32::MAX);
        }

        info!("fetching from {}", params.remote);
        remote.fetch::<&str>(&[], Some(&mut fetch_options), None)?;

        Ok(())
    }

    async fn checkout(&self, branch: &str) -> Result<()> {
        let repo = self.repo.lock().await;
        let ref_name = format!("refs/heads/{branch}");
        let target = repo.revparse_single(&ref_name)?;
        repo.checkout_tree(&target, None)?;
        repo.set_head(&ref_name)?;
        Ok(())
    }

    async fn create_branch(&self, branch: &str) -> Result<()> {
        let repo = self.repo.lock().await;
        let commit = repo.head()?.peel_to_commit()?;
        repo.branch(branch, &commit, false)?;
        repo.set_head(&format!("refs/heads/{branch}"))?;
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> Result<()> {
        let repo = self.repo.lock().await;
        repo.find_branch(branch, BranchType::Local)?.delete()?;
        Ok(())
    }

    async fn get_config(&self, key: &str) -> Result<Option<String>> {
        let repo = self.repo.lock().await;
        let config = repo.config()?.snapshot()?;

        match config.get_string(key) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let repo = self.repo.lock().await;
        repo.config()?.set_str(key, value)?;
        Ok(())
    }

    async fn last_commit_message(&self) -> Result<String> {
        let repo = self.repo.lock().await;
        let commit = repo.head()?.peel_to_commit()?;
        Ok(commit.message().unwrap_or("").to_string())
    }
}
