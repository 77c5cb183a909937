//! Release types and semantic version increment rules.
//!
//! Increments follow the node-semver `inc` semantics that npm-style release
//! tooling expects: `pre*` types start a new prerelease train at `<id>.0`,
//! `prerelease` advances the current train, and plain release types graduate
//! a prerelease when its stable part already carries that bump.
use semver::{BuildMetadata, Prerelease, Version};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::Result;

/// Supported kinds of version increment.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
    Major,
    Minor,
    Patch,
    Premajor,
    Preminor,
    Prepatch,
    Prerelease,
}

impl ReleaseType {
    /// Rank of the stable release types: patch < minor < major.
    /// Prerelease types carry no rank.
    fn rank(self) -> Option<u8> {
        match self {
            ReleaseType::Patch => Some(0),
            ReleaseType::Minor => Some(1),
            ReleaseType::Major => Some(2),
            _ => None,
        }
    }

    /// The `pre*` counterpart of a stable release type.
    fn to_pre(self) -> ReleaseType {
        match self {
            ReleaseType::Major => ReleaseType::Premajor,
            ReleaseType::Minor => ReleaseType::Preminor,
            ReleaseType::Patch => ReleaseType::Prepatch,
            other => other,
        }
    }
}

impl Display for ReleaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReleaseType::Major => f.write_str("major"),
            ReleaseType::Minor => f.write_str("minor"),
            ReleaseType::Patch => f.write_str("patch"),
            ReleaseType::Premajor => f.write_str("premajor"),
            ReleaseType::Preminor => f.write_str("preminor"),
            ReleaseType::Prepatch => f.write_str("prepatch"),
            ReleaseType::Prerelease => f.write_str("prerelease"),
        }
    }
}

/// Returns true when the version carries a prerelease component.
pub fn is_prerelease(version: &Version) -> bool {
    !version.pre.is_empty()
}

/// Prerelease identifiers of a version, or `None` for stable versions.
pub fn prerelease_identifiers(version: &Version) -> Option<Vec<String>> {
    if version.pre.is_empty() {
        return None;
    }

    Some(version.pre.as_str().split('.').map(String::from).collect())
}

/// The first of patch, minor, major whose component is non-zero. For a
/// prerelease this is the bump the current train is heading towards.
pub fn active_release_type(version: &Version) -> Option<ReleaseType> {
    if version.patch != 0 {
        Some(ReleaseType::Patch)
    } else if version.minor != 0 {
        Some(ReleaseType::Minor)
    } else if version.major != 0 {
        Some(ReleaseType::Major)
    } else {
        None
    }
}

/// Whether the active bump of the current version is the requested one.
fn same_kind(version: &Version, release_type: ReleaseType) -> bool {
    active_release_type(version) == Some(release_type)
}

/// Whether the active bump of the current version outranks the requested one.
fn dominates(version: &Version, release_type: ReleaseType) -> bool {
    let active = active_release_type(version).and_then(ReleaseType::rank);

    match (active, release_type.rank()) {
        (Some(active), Some(requested)) => active > requested,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Map a requested release type onto the type that should actually be applied
/// when a prerelease identifier is requested.
///
/// A version already on a prerelease train continues that train when the
/// train is heading to the same or a bigger bump than requested. Otherwise a
/// new train is started with the `pre*` variant.
pub fn resolve_release_type(
    release_type: ReleaseType,
    version: &Version,
    prerelease: Option<&str>,
) -> ReleaseType {
    if prerelease.is_none() {
        return release_type;
    }

    if is_prerelease(version)
        && (same_kind(version, release_type)
            || dominates(version, release_type))
    {
        return ReleaseType::Prerelease;
    }

    release_type.to_pre()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Identifier {
    Numeric(u64),
    Alpha(String),
}

impl Identifier {
    fn parse(raw: &str) -> Self {
        match raw.parse::<u64>() {
            Ok(n) if !raw.starts_with('0') || raw == "0" => {
                Identifier::Numeric(n)
            }
            _ => Identifier::Alpha(raw.to_string()),
        }
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identifier::Numeric(n) => write!(f, "{n}"),
            Identifier::Alpha(s) => f.write_str(s),
        }
    }
}

struct Parts {
    major: u64,
    minor: u64,
    patch: u64,
    pre: Vec<Identifier>,
}

impl Parts {
    fn from_version(version: &Version) -> Self {
        let pre = if version.pre.is_empty() {
            vec![]
        } else {
            version.pre.as_str().split('.').map(Identifier::parse).collect()
        };

        Self {
            major: version.major,
            minor: version.minor,
            patch: version.patch,
            pre,
        }
    }

    fn into_version(self) -> Result<Version> {
        let pre = if self.pre.is_empty() {
            Prerelease::EMPTY
        } else {
            let joined = self
                .pre
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(".");
            Prerelease::new(&joined)?
        };

        Ok(Version {
            major: self.major,
            minor: self.minor,
            patch: self.patch,
            pre,
            build: BuildMetadata::EMPTY,
        })
    }

    fn inc_major(&mut self) {
        if self.minor != 0 || self.patch != 0 || self.pre.is_empty() {
            self.major += 1;
        }
        self.minor = 0;
        self.patch = 0;
        self.pre.clear();
    }

    fn inc_minor(&mut self) {
        if self.patch != 0 || self.pre.is_empty() {
            self.minor += 1;
        }
        self.patch = 0;
        self.pre.clear();
    }

    fn inc_patch(&mut self) {
        if self.pre.is_empty() {
            self.patch += 1;
        }
        self.pre.clear();
    }

    fn inc_pre(&mut self, identifier: Option<&str>) {
        if self.pre.is_empty() {
            self.pre.push(Identifier::Numeric(0));
        } else if let Some(Identifier::Numeric(n)) = self
            .pre
            .iter_mut()
            .rev()
            .find(|id| matches!(id, Identifier::Numeric(_)))
        {
            *n += 1;
        } else {
            self.pre.push(Identifier::Numeric(0));
        }

        let Some(identifier) = identifier.filter(|id| !id.is_empty()) else {
            return;
        };

        let fresh = vec![Identifier::parse(identifier), Identifier::Numeric(0)];
        let same_train = self.pre.first().map(|id| id.to_string()).as_deref()
            == Some(identifier);

        if !same_train || !matches!(self.pre.get(1), Some(Identifier::Numeric(_)))
        {
            self.pre = fresh;
        }
    }
}

/// Increment a version by the given release type. `identifier` names the
/// prerelease train used by the `pre*` types.
pub fn increment(
    version: &Version,
    release_type: ReleaseType,
    identifier: Option<&str>,
) -> Result<Version> {
    let mut parts = Parts::from_version(version);

    match release_type {
        ReleaseType::Major => parts.inc_major(),
        ReleaseType::Minor => parts.inc_minor(),
        ReleaseType::Patch => parts.inc_patch(),
        ReleaseType::Premajor => {
            parts.pre.clear();
            parts.patch = 0;
            parts.minor = 0;
            parts.major += 1;
            parts.inc_pre(identifier);
        }
        ReleaseType::Preminor => {
            parts.pre.clear();
            parts.patch = 0;
            parts.minor += 1;
            parts.inc_pre(identifier);
        }
        ReleaseType::Prepatch => {
            parts.pre.clear();
            parts.inc_patch();
            parts.inc_pre(identifier);
        }
        ReleaseType::Prerelease => {
            if parts.pre.is_empty() {
                parts.inc_patch();
            }
            parts.inc_pre(identifier);
        }
    }

    parts.into_version()
}
