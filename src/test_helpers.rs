//! Common test helper functions shared across test modules.
//!
//! This module provides reusable fixtures for git repositories and manifest
//! files, reducing code duplication across different test suites.
use futures_util::{StreamExt, stream};
use git2::{Oid, Repository, RepositoryInitOptions, Signature};
use semver::Version;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::analyzer::NotesStream;

/// Initializes a repository with `main` as its initial branch and a local
/// committer identity.
///
/// # Example
/// ```ignore
/// let dir = TempDir::new().unwrap();
/// let repo = init_repo(dir.path());
/// ```
pub fn init_repo(path: &Path) -> Repository {
    let mut options = RepositoryInitOptions::new();
    options.initial_head("main");

    let repo = Repository::init_opts(path, &options).unwrap();

    {
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Test User").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
    }

    repo
}

/// Writes `content` to `path` (relative to the work tree) and commits it on
/// top of HEAD.
pub fn commit_file(
    repo: &Repository,
    path: &str,
    content: &str,
    message: &str,
) -> Oid {
    let workdir = repo.workdir().unwrap();
    let full_path = workdir.join(path);

    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent).unwrap();
    }

    fs::write(&full_path, content).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(path)).unwrap();
    index.write().unwrap();

    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let signature = Signature::now("Test User", "test@example.com").unwrap();

    let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
    let parents = parent.iter().collect::<Vec<_>>();

    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .unwrap()
}

/// Creates a lightweight tag pointing at HEAD.
pub fn tag_head(repo: &Repository, name: &str) {
    let head = repo.head().unwrap().peel_to_commit().unwrap();
    repo.tag_lightweight(name, head.as_object(), false).unwrap();
}

/// Writes a `package.json` into `dir` and returns its path.
pub fn write_package_json(
    dir: &Path,
    name: &str,
    version: &str,
    private: bool,
) -> PathBuf {
    fs::create_dir_all(dir).unwrap();

    let path = dir.join("package.json");
    let private = if private { ",\n  \"private\": true" } else { "" };

    fs::write(
        &path,
        format!(
            "{{\n  \"name\": \"{name}\",\n  \"version\": \"{version}\"{private}\n}}\n"
        ),
    )
    .unwrap();

    path
}

/// Release notes for `version` with a compare link from `previous_tag`,
/// shaped like the conventional analyzer output.
pub fn release_notes(previous_tag: &str, version: &Version) -> String {
    format!(
        "## [{version}](https://example.com/compare/{previous_tag}...v{version}) (2025-01-01)\n\n### Features\n\n* add widget\n"
    )
}

/// Notes stream split into one chunk per line.
pub fn notes_stream(notes: String) -> NotesStream {
    let chunks = notes
        .split_inclusive('\n')
        .map(|line| Ok(line.to_string()))
        .collect::<Vec<_>>();

    stream::iter(chunks).boxed()
}
