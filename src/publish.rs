//! Package publishing through the npm or pnpm command line.
use async_trait::async_trait;
use log::*;
#[cfg(test)]
use mockall::automock;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, path::PathBuf, process::Stdio};
use tokio::process::Command;

use crate::{ReleaseError, Result, options::PublishOptions};

/// Everything a publisher needs to publish one project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishRequest {
    /// Directory the package manager runs in.
    pub project_path: PathBuf,
    pub name: String,
    pub version: String,
    pub access: Option<String>,
    /// Distribution tag.
    pub tag: Option<String>,
    pub otp: Option<String>,
    pub workspaces: bool,
    pub git_checks: bool,
    pub dry_run: bool,
}

impl PublishRequest {
    /// Build a request from publish options. Prerelease versions without an
    /// explicit tag are published under their first prerelease identifier.
    pub fn new(
        project_path: PathBuf,
        name: String,
        version: &Version,
        options: &PublishOptions,
    ) -> Self {
        let tag = options.tag.clone().or_else(|| {
            version
                .pre
                .as_str()
                .split('.')
                .next()
                .filter(|id| !id.is_empty())
                .map(|id| id.to_string())
        });

        Self {
            project_path,
            name,
            version: version.to_string(),
            access: options.access.clone(),
            tag,
            otp: options.otp.clone(),
            workspaces: options.workspaces.unwrap_or(false),
            git_checks: options.git_checks.unwrap_or(true),
            dry_run: options.dry_run.unwrap_or(false),
        }
    }
}

/// Publishes a project to its registry.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, request: &PublishRequest) -> Result<()>;
}

/// Supported package managers.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    #[default]
    Npm,
    Pnpm,
}

impl PackageManager {
    pub fn program(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Pnpm => "pnpm",
        }
    }
}

impl Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.program())
    }
}

/// [`Publisher`] spawning `npm publish` or `pnpm publish`.
#[derive(Debug, Clone, Default)]
pub struct PackageManagerPublisher {
    manager: PackageManager,
}

impl PackageManagerPublisher {
    pub fn new(manager: PackageManager) -> Self {
        Self { manager }
    }

    /// Command line arguments for a publish request.
    pub fn args(&self, request: &PublishRequest) -> Vec<String> {
        let mut args = vec!["publish".to_string()];

        if let Some(access) = &request.access {
            args.push("--access".into());
            args.push(access.clone());
        }

        if let Some(tag) = &request.tag {
            args.push("--tag".into());
            args.push(tag.clone());
        }

        if request.workspaces {
            match self.manager {
                PackageManager::Npm => args.push("--workspaces".into()),
                PackageManager::Pnpm => args.push("--recursive".into()),
            }
        }

        if self.manager == PackageManager::Pnpm && !request.git_checks {
            args.push("--no-git-checks".into());
        }

        if request.dry_run {
            args.push("--dry-run".into());
        }

        if let Some(otp) = &request.otp {
            args.push("--otp".into());
            args.push(otp.clone());
        }

        args
    }
}

#[async_trait]
impl Publisher for PackageManagerPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<()> {
        let args = self.args(request);

        info!(
            "publishing {}@{} with {}",
            request.name, request.version, self.manager
        );
        debug!("{} {}", self.manager, args.join(" "));

        let mut command = Command::new(self.manager.program());
        command.args(&args);
        command.stdin(Stdio::null());

        if !request.project_path.as_os_str().is_empty() {
            command.current_dir(&request.project_path);
        }

        let status = command.status().await?;

        if !status.success() {
            return Err(ReleaseError::ProcessFailed {
                command: format!("{} publish", self.manager),
                status: status.to_string(),
            });
        }

        Ok(())
    }
}
