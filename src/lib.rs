//! Release automation for single packages and monorepos.
//!
//! A [`project::Project`] computes its next version from conventional commits,
//! rewrites its manifest and changelog, and reports the tags and release data
//! of the result. A [`project::MonorepoProject`] coordinates child projects in
//! fixed or independent mode. The [`releaser::Releaser`] runs an ordered
//! pipeline of git, hosting and publish steps over either of them.
pub mod analyzer;
pub mod changelog;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod git;
pub mod hosting;
pub mod manifest;
pub mod options;
pub mod project;
pub mod publish;
pub mod releaser;
pub mod version;

pub use error::{ReleaseError, Result};

#[cfg(test)]
pub mod test_helpers;
