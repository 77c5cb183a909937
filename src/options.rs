//! Option structs for projects and releaser steps.
//!
//! Every field is optional so partial option sets coming from the config file,
//! `Releaser::set_options` and individual step invocations can be layered with
//! [`merge::Merge`]. `a.merge(b)` keeps the values already set in `a` and fills
//! the gaps from `b`.
use merge::Merge;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::version::ReleaseType;

/// Layer `overrides` on top of `base`: fields set in `overrides` win.
pub fn layered<T: Merge + Default>(overrides: Option<T>, base: Option<T>) -> T {
    let mut layered = overrides.unwrap_or_default();
    layered.merge(base.unwrap_or_default());
    layered
}

/// Per-project bump overrides used by monorepos.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Merge)]
#[merge(strategy = merge::option::overwrite_none)]
#[serde(default, deny_unknown_fields)]
pub struct ByProjectOptions {
    pub version: Option<String>,
    #[serde(rename = "as")]
    pub release_as: Option<ReleaseType>,
    pub prerelease: Option<String>,
    pub first_release: Option<bool>,
    pub skip: Option<bool>,
}

/// Options for computing the next version and bumping a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Merge)]
#[merge(strategy = merge::option::overwrite_none)]
#[serde(default, deny_unknown_fields)]
pub struct BumpOptions {
    /// Explicit version. Used verbatim when it is valid semver.
    pub version: Option<String>,
    /// Release type override, skipping commit analysis.
    #[serde(rename = "as")]
    pub release_as: Option<ReleaseType>,
    /// Prerelease identifier, e.g. `alpha`.
    pub prerelease: Option<String>,
    /// Release the current version as is. Detected from tags when unset.
    pub first_release: Option<bool>,
    pub skip: Option<bool>,
    /// Bump private projects too, and in fixed monorepos bump children
    /// without changes.
    pub force: Option<bool>,
    pub tag_prefix: Option<String>,
    #[serde(skip)]
    pub dry_run: Option<bool>,
    pub by_project: Option<HashMap<String, ByProjectOptions>>,
}

impl BumpOptions {
    pub fn force(&self) -> bool {
        self.force.unwrap_or(false)
    }

    pub fn skip(&self) -> bool {
        self.skip.unwrap_or(false)
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run.unwrap_or(false)
    }

    /// Options for one monorepo child: `by_project[name]` layered over these
    /// options, without the per-project table itself.
    pub fn for_project(&self, name: &str) -> BumpOptions {
        let overrides = self
            .by_project
            .as_ref()
            .and_then(|by_project| by_project.get(name))
            .cloned()
            .unwrap_or_default();

        BumpOptions {
            version: overrides.version.or_else(|| self.version.clone()),
            release_as: overrides.release_as.or(self.release_as),
            prerelease: overrides.prerelease.or_else(|| self.prerelease.clone()),
            first_release: overrides.first_release.or(self.first_release),
            skip: overrides.skip.or(self.skip),
            force: self.force,
            tag_prefix: self.tag_prefix.clone(),
            dry_run: self.dry_run,
            by_project: None,
        }
    }
}

/// Options for computing the tags of a release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagsOptions {
    pub tag_prefix: Option<String>,
    /// Drop tags that already exist (default: true).
    pub verify: Option<bool>,
}

impl TagsOptions {
    pub fn verify(&self) -> bool {
        self.verify.unwrap_or(true)
    }
}

/// Options for assembling release data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseDataOptions {
    pub tag_prefix: Option<String>,
}

/// Options for the checkout step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Merge)]
#[merge(strategy = merge::option::overwrite_none)]
#[serde(default, deny_unknown_fields)]
pub struct CheckoutOptions {
    /// Release branch (default: `simple-release`).
    pub branch: Option<String>,
    /// Value for git `user.name`.
    pub username: Option<String>,
    /// Value for git `user.email`.
    pub email: Option<String>,
    /// Fetch all commits and tags first.
    pub fetch: Option<bool>,
    /// Delete and recreate the branch when it exists.
    pub force: Option<bool>,
}

/// Options for the commit step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Merge)]
#[merge(strategy = merge::option::overwrite_none)]
#[serde(default, deny_unknown_fields)]
pub struct CommitOptions {
    pub amend: Option<bool>,
}

/// Options for the tag step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Merge)]
#[merge(strategy = merge::option::overwrite_none)]
#[serde(default, deny_unknown_fields)]
pub struct TagOptions {
    /// Annotation message. Lightweight tags are created without one.
    pub message: Option<String>,
    /// Fetch remote tags before checking which tags already exist.
    pub fetch: Option<bool>,
}

/// Options for the push step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Merge)]
#[merge(strategy = merge::option::overwrite_none)]
#[serde(default, deny_unknown_fields)]
pub struct PushOptions {
    pub remote: Option<String>,
    pub force: Option<bool>,
}

/// Options for the publish step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Merge)]
#[merge(strategy = merge::option::overwrite_none)]
#[serde(default, deny_unknown_fields)]
pub struct PublishOptions {
    pub access: Option<String>,
    /// Distribution tag. Prereleases default to their first identifier.
    pub tag: Option<String>,
    pub otp: Option<String>,
    /// pnpm only: run the branch and clean-tree checks (default: true).
    pub git_checks: Option<bool>,
    /// Publish every workspace package.
    pub workspaces: Option<bool>,
    #[serde(skip)]
    pub dry_run: Option<bool>,
}

/// Options for the release step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Merge)]
#[merge(strategy = merge::option::overwrite_none)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseOptions {
    pub draft: Option<bool>,
}

/// Options for the pull request step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Merge)]
#[merge(strategy = merge::option::overwrite_none)]
#[serde(default, deny_unknown_fields)]
pub struct PullRequestOptions {
    /// Source branch (default: the checked out release branch).
    pub from: Option<String>,
    /// Target branch (default: the branch checked out before the release
    /// branch).
    pub to: Option<String>,
    pub draft: Option<bool>,
}

/// Default options per releaser step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Merge)]
#[merge(strategy = merge::option::recurse)]
#[serde(default, deny_unknown_fields)]
pub struct StepsOptions {
    pub checkout: Option<CheckoutOptions>,
    pub bump: Option<BumpOptions>,
    pub commit: Option<CommitOptions>,
    pub tag: Option<TagOptions>,
    pub push: Option<PushOptions>,
    pub publish: Option<PublishOptions>,
    pub release: Option<ReleaseOptions>,
    pub pull_request: Option<PullRequestOptions>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layered_prefers_overrides_per_field() {
        let base = CheckoutOptions {
            branch: Some("release".into()),
            username: Some("bot".into()),
            ..Default::default()
        };
        let overrides = CheckoutOptions {
            branch: Some("next".into()),
            fetch: Some(true),
            ..Default::default()
        };

        let layered = layered(Some(overrides), Some(base));

        assert_eq!(layered.branch.as_deref(), Some("next"));
        assert_eq!(layered.username.as_deref(), Some("bot"));
        assert_eq!(layered.fetch, Some(true));
        assert_eq!(layered.force, None);
    }

    #[test]
    fn test_steps_options_merge_recurses() {
        let mut later = StepsOptions {
            bump: Some(BumpOptions {
                prerelease: Some("beta".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let earlier = StepsOptions {
            bump: Some(BumpOptions {
                prerelease: Some("alpha".into()),
                force: Some(true),
                ..Default::default()
            }),
            push: Some(PushOptions {
                remote: Some("upstream".into()),
                ..Default::default()
            }),
            ..Default::default()
        };

        later.merge(earlier);

        let bump = later.bump.unwrap();
        assert_eq!(bump.prerelease.as_deref(), Some("beta"));
        assert_eq!(bump.force, Some(true));
        assert_eq!(later.push.unwrap().remote.as_deref(), Some("upstream"));
    }

    #[test]
    fn test_for_project_overlays_by_project_options() {
        let options = BumpOptions {
            prerelease: Some("alpha".into()),
            force: Some(true),
            tag_prefix: Some("ignored@".into()),
            by_project: Some(HashMap::from([(
                "@acme/core".to_string(),
                ByProjectOptions {
                    release_as: Some(ReleaseType::Major),
                    prerelease: Some("rc".into()),
                    ..Default::default()
                },
            )])),
            ..Default::default()
        };

        let core = options.for_project("@acme/core");
        assert_eq!(core.release_as, Some(ReleaseType::Major));
        assert_eq!(core.prerelease.as_deref(), Some("rc"));
        assert_eq!(core.force, Some(true));
        assert_eq!(core.by_project, None);

        let other = options.for_project("@acme/ui");
        assert_eq!(other.release_as, None);
        assert_eq!(other.prerelease.as_deref(), Some("alpha"));
    }

    #[test]
    fn test_bump_options_deserialize_as_keyword() {
        let options: BumpOptions = toml::from_str(
            r#"
as = "minor"
prerelease = "beta"

[by_project.core]
skip = true
"#,
        )
        .unwrap();

        assert_eq!(options.release_as, Some(ReleaseType::Minor));
        assert_eq!(options.prerelease.as_deref(), Some("beta"));
        assert_eq!(
            options.by_project.unwrap()["core"].skip,
            Some(true)
        );
    }
}
