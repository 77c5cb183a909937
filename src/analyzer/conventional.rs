use async_trait::async_trait;
use chrono::Local;
use futures_util::{StreamExt, stream};
use git_conventional::Commit as ConventionalCommit;
use git2::{Oid, Sort};
use log::*;
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::{
    path::PathBuf,
    sync::{Arc, LazyLock},
};
use tokio::sync::Mutex;

use crate::{
    Result,
    analyzer::{CommitAnalyzer, CommitScope, NotesStream},
    git::repository::{commit_touches, find_last_tag, repo_relative},
    version::ReleaseType,
};

/// Matches 3 or more consecutive new lines
static EXTRA_NEW_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Prefix of the commits created by the release pipeline itself.
pub const RELEASE_COMMIT_PREFIX: &str = "chore(release):";

/// Default release-notes template.
pub const DEFAULT_BODY: &str = r#"## {% if compare_url %}[{{ version }}]({{ compare_url }}){% else %}{{ version }}{% endif %} ({{ date }})
{% if breaking %}
### ⚠ BREAKING CHANGES
{% for commit in breaking %}
* {% if commit.scope %}**{{ commit.scope }}:** {% endif %}{{ commit.breaking_description }}
{%- endfor %}
{% endif %}
{%- for group in groups %}
### {{ group.title }}
{% for commit in group.commits %}
* {% if commit.scope %}**{{ commit.scope }}:** {% endif %}{{ commit.description }} {% if commit.link %}([{{ commit.short_id }}]({{ commit.link }})){% else %}({{ commit.short_id }}){% endif %}
{%- endfor %}
{% endfor %}
"#;

/// Configuration for commit analysis and notes rendering. Deserialized from
/// the `[changelog]` table of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzerConfig {
    /// Tera template for the release notes.
    pub body: String,
    /// Repository web URL used for compare and commit links.
    pub repository_url: Option<String>,
    /// Skips merge commits (default: true)
    pub skip_merge_commits: bool,
    /// Skips commits created by previous releases (default: true)
    pub skip_release_commits: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            body: DEFAULT_BODY.into(),
            repository_url: None,
            skip_merge_commits: true,
            skip_release_commits: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Bump {
    Patch,
    Minor,
    Major,
}

impl From<Bump> for ReleaseType {
    fn from(bump: Bump) -> Self {
        match bump {
            Bump::Patch => ReleaseType::Patch,
            Bump::Minor => ReleaseType::Minor,
            Bump::Major => ReleaseType::Major,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct NotesCommit {
    id: String,
    short_id: String,
    kind: String,
    scope: Option<String>,
    description: String,
    body: Option<String>,
    breaking: bool,
    breaking_description: Option<String>,
    link: Option<String>,
}

impl NotesCommit {
    fn bump(&self) -> Option<Bump> {
        if self.breaking {
            return Some(Bump::Major);
        }

        match self.kind.as_str() {
            "feat" => Some(Bump::Minor),
            "fix" | "perf" => Some(Bump::Patch),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct NotesGroup {
    title: &'static str,
    commits: Vec<NotesCommit>,
}

#[derive(Debug, Serialize)]
struct NotesContext {
    version: String,
    date: String,
    previous_tag: Option<String>,
    next_tag: String,
    compare_url: Option<String>,
    breaking: Vec<NotesCommit>,
    groups: Vec<NotesGroup>,
}

const GROUPS: [(&str, &str); 4] = [
    ("feat", "Features"),
    ("fix", "Bug Fixes"),
    ("perf", "Performance Improvements"),
    ("revert", "Reverts"),
];

struct ScopedCommits {
    previous_tag: Option<String>,
    commits: Vec<NotesCommit>,
}

/// Analyzes conventional commits read straight from the local repository.
pub struct ConventionalAnalyzer {
    repo: Arc<Mutex<git2::Repository>>,
    config: AnalyzerConfig,
}

impl ConventionalAnalyzer {
    pub fn new(
        repo: Arc<Mutex<git2::Repository>>,
        config: AnalyzerConfig,
    ) -> Self {
        Self { repo, config }
    }

    fn commit_link(&self, id: &str) -> Option<String> {
        self.config
            .repository_url
            .as_ref()
            .map(|url| format!("{}/commit/{id}", url.trim_end_matches('/')))
    }

    fn compare_url(&self, previous: &str, next: &str) -> Option<String> {
        self.config.repository_url.as_ref().map(|url| {
            format!(
                "{}/compare/{previous}...{next}",
                url.trim_end_matches('/')
            )
        })
    }

    fn parse_commit(&self, commit: &git2::Commit) -> Option<NotesCommit> {
        let message = commit.message().unwrap_or("");

        if self.config.skip_merge_commits && commit.parent_count() > 1 {
            return None;
        }

        if self.config.skip_release_commits
            && message.starts_with(RELEASE_COMMIT_PREFIX)
        {
            return None;
        }

        let id = commit.id().to_string();
        let short_id = id.chars().take(7).collect::<String>();

        match ConventionalCommit::parse(message.trim_end()) {
            Ok(parsed) => Some(NotesCommit {
                link: self.commit_link(&id),
                id,
                short_id,
                kind: parsed.type_().as_str().to_lowercase(),
                scope: parsed.scope().map(|s| s.to_string()),
                description: parsed.description().to_string(),
                body: parsed.body().map(|b| b.to_string()),
                breaking: parsed.breaking(),
                breaking_description: parsed
                    .breaking_description()
                    .map(|d| d.to_string()),
            }),
            Err(_) => {
                debug!("skipping non conventional commit: {short_id}");
                None
            }
        }
    }

    async fn scoped_commits(&self, scope: &CommitScope) -> Result<ScopedCommits> {
        let repo = self.repo.lock().await;

        if repo.head().is_err() {
            return Ok(ScopedCommits {
                previous_tag: None,
                commits: vec![],
            });
        }

        let relative: PathBuf = repo_relative(&repo, &scope.path)?;
        let last_tag: Option<(String, Oid)> =
            find_last_tag(&repo, &scope.tag_prefix, None)?;

        let mut revwalk = repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        revwalk.push_head()?;

        if let Some((_, oid)) = &last_tag {
            revwalk.hide(*oid)?;
        }

        let mut commits = vec![];

        for oid in revwalk {
            let commit = repo.find_commit(oid?)?;

            if !commit_touches(&repo, &commit, &relative)? {
                continue;
            }

            if let Some(parsed) = self.parse_commit(&commit) {
                debug!(
                    "processing commit: {} : {}",
                    parsed.short_id, parsed.description
                );
                commits.push(parsed);
            }
        }

        Ok(ScopedCommits {
            previous_tag: last_tag.map(|(name, _)| name),
            commits,
        })
    }

    fn render(&self, context: &NotesContext) -> Result<String> {
        let context = tera::Context::from_serialize(context)?;
        let rendered = tera::Tera::one_off(&self.config.body, &context, false)?;
        let normalized = EXTRA_NEW_LINES.replace_all(&rendered, "\n\n");
        Ok(format!("{}\n", normalized.trim()))
    }
}

#[async_trait]
impl CommitAnalyzer for ConventionalAnalyzer {
    async fn release_type(
        &self,
        scope: &CommitScope,
    ) -> Result<Option<ReleaseType>> {
        let scoped = self.scoped_commits(scope).await?;

        let bump = scoped.commits.iter().filter_map(NotesCommit::bump).max();

        info!(
            "{} commits since {}: release type {}",
            scoped.commits.len(),
            scoped.previous_tag.as_deref().unwrap_or("the beginning"),
            bump.map(|b| ReleaseType::from(b).to_string())
                .unwrap_or_else(|| "none".into())
        );

        Ok(bump.map(ReleaseType::from))
    }

    async fn render_notes(
        &self,
        scope: &CommitScope,
        version: &Version,
    ) -> Result<NotesStream> {
        let scoped = self.scoped_commits(scope).await?;
        // an empty prefix stands for plain `v` tags
        let next_tag = match scope.tag_prefix.as_str() {
            "" => format!("v{version}"),
            prefix => format!("{prefix}{version}"),
        };

        let compare_url = scoped
            .previous_tag
            .as_deref()
            .and_then(|previous| self.compare_url(previous, &next_tag));

        let breaking = scoped
            .commits
            .iter()
            .filter(|c| c.breaking)
            .map(|c| {
                let mut commit = c.clone();
                if commit.breaking_description.is_none() {
                    commit.breaking_description = Some(c.description.clone());
                }
                commit
            })
            .collect();

        let groups = GROUPS
            .iter()
            .map(|(kind, title)| NotesGroup {
                title: *title,
                commits: scoped
                    .commits
                    .iter()
                    .filter(|c| c.kind == *kind)
                    .cloned()
                    .collect(),
            })
            .filter(|group| !group.commits.is_empty())
            .collect();

        let context = NotesContext {
            version: version.to_string(),
            date: Local::now().format("%Y-%m-%d").to_string(),
            previous_tag: scoped.previous_tag,
            next_tag,
            compare_url,
            breaking,
            groups,
        };

        let notes = self.render(&context)?;

        let chunks: Vec<Result<String>> = notes
            .split_inclusive('\n')
            .map(|line| Ok(line.to_string()))
            .collect();

        Ok(stream::iter(chunks).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        changelog::{collect_notes, extract_last_release},
        test_helpers::{commit_file, init_repo, tag_head},
    };
    use tempfile::TempDir;

    fn analyzer(dir: &TempDir, repository_url: Option<&str>) -> ConventionalAnalyzer {
        let repo = git2::Repository::open(dir.path()).unwrap();
        ConventionalAnalyzer::new(
            Arc::new(Mutex::new(repo)),
            AnalyzerConfig {
                repository_url: repository_url.map(String::from),
                ..AnalyzerConfig::default()
            },
        )
    }

    fn scope(dir: &TempDir, path: &str, prefix: &str) -> CommitScope {
        CommitScope {
            path: dir.path().join(path),
            tag_prefix: prefix.into(),
        }
    }

    #[tokio::test]
    async fn test_release_type_from_commits_since_tag() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "src/lib.rs", "1", "feat!: first major");
        tag_head(&repo, "v2.0.0");
        commit_file(&repo, "src/lib.rs", "2", "feat: add widget");
        commit_file(&repo, "src/lib.rs", "3", "fix: widget size");

        let analyzer = analyzer(&dir, None);

        assert_eq!(
            analyzer.release_type(&scope(&dir, "", "v")).await.unwrap(),
            Some(ReleaseType::Minor)
        );
    }

    #[tokio::test]
    async fn test_release_type_classification() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "a.txt", "1", "chore: init");
        tag_head(&repo, "v1.0.0");

        let analyzer = analyzer(&dir, None);
        let root = scope(&dir, "", "v");

        commit_file(&repo, "a.txt", "2", "docs: readme");
        assert_eq!(analyzer.release_type(&root).await.unwrap(), None);

        commit_file(&repo, "a.txt", "3", "perf: faster");
        assert_eq!(
            analyzer.release_type(&root).await.unwrap(),
            Some(ReleaseType::Patch)
        );

        commit_file(
            &repo,
            "a.txt",
            "4",
            "refactor: api\n\nBREAKING CHANGE: removed old api",
        );
        assert_eq!(
            analyzer.release_type(&root).await.unwrap(),
            Some(ReleaseType::Major)
        );
    }

    #[tokio::test]
    async fn test_release_type_is_scoped_by_path_and_prefix() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "packages/a/index.js", "1", "feat: a");
        commit_file(&repo, "packages/b/index.js", "1", "feat: b");
        tag_head(&repo, "a@1.0.0");
        tag_head(&repo, "b@1.0.0");
        commit_file(&repo, "packages/b/index.js", "2", "fix: b only");

        let analyzer = analyzer(&dir, None);

        assert_eq!(
            analyzer
                .release_type(&scope(&dir, "packages/a", "a@"))
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            analyzer
                .release_type(&scope(&dir, "packages/b", "b@"))
                .await
                .unwrap(),
            Some(ReleaseType::Patch)
        );
    }

    #[tokio::test]
    async fn test_release_commits_are_ignored() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "a.txt", "1", "feat: init");
        tag_head(&repo, "v1.0.0");
        commit_file(&repo, "a.txt", "2", "chore(release): 1.0.1");

        let analyzer = analyzer(&dir, None);

        assert_eq!(
            analyzer.release_type(&scope(&dir, "", "v")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_render_notes_groups_and_compare_link() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "a.txt", "1", "feat: init");
        tag_head(&repo, "v2.0.0");
        commit_file(&repo, "a.txt", "2", "feat(ui): add dial");
        commit_file(&repo, "a.txt", "3", "fix: dial overflow");
        commit_file(&repo, "a.txt", "4", "ci: cache deps");

        let analyzer = analyzer(&dir, Some("https://github.com/acme/widgets/"));
        let version = Version::parse("2.1.0").unwrap();

        let stream = analyzer
            .render_notes(&scope(&dir, "", "v"), &version)
            .await
            .unwrap();
        let notes = collect_notes(stream).await.unwrap();

        assert!(notes.starts_with(
            "## [2.1.0](https://github.com/acme/widgets/compare/v2.0.0...v2.1.0) ("
        ));
        assert!(notes.contains("### Features"));
        assert!(notes.contains("* **ui:** add dial (["));
        assert!(notes.contains("### Bug Fixes"));
        assert!(notes.contains("* dial overflow (["));
        assert!(!notes.contains("cache deps"));
        assert!(!notes.contains("\n\n\n"));
        assert!(notes.ends_with('\n'));

        let release = extract_last_release([notes.as_str()]);
        assert_eq!(release.version, "2.1.0");
        assert_eq!(release.previous_tag, "v2.0.0");
        assert_eq!(release.next_tag, "v2.1.0");
    }

    #[tokio::test]
    async fn test_render_notes_lists_breaking_changes() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        commit_file(
            &repo,
            "a.txt",
            "1",
            "feat(api)!: drop v1 endpoints\n\nBREAKING CHANGE: v1 is gone",
        );

        let analyzer = analyzer(&dir, None);
        let version = Version::parse("1.0.0").unwrap();

        let notes = collect_notes(
            analyzer
                .render_notes(&scope(&dir, "", "v"), &version)
                .await
                .unwrap(),
        )
        .await
        .unwrap();

        assert!(notes.starts_with("## 1.0.0 ("));
        assert!(notes.contains("### ⚠ BREAKING CHANGES"));
        assert!(notes.contains("* **api:** v1 is gone"));
    }
}
