//! Custom error types for simple-release.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for simple-release operations.
#[derive(Error, Debug)]
pub enum ReleaseError {
    // Usage errors
    #[error("Nothing to commit")]
    NothingToCommit,

    #[error(
        "Monorepo project does not support next version computation unless it is in fixed mode with an explicit version"
    )]
    MonorepoNextVersion,

    #[error(
        "Hosting service is not configured: cannot run the {0} step"
    )]
    HostingNotConfigured(&'static str),

    #[error("Publishing is not configured for project '{0}'")]
    PublishNotConfigured(String),

    #[error("Cannot create a pull request from the same branch: {0}")]
    SameBranch(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Manifest errors
    #[error("Manifest {} is missing field '{field}'", path.display())]
    MissingField { path: PathBuf, field: &'static str },

    #[error("Invalid manifest {}: {reason}", path.display())]
    InvalidManifest { path: PathBuf, reason: String },

    // Collaborator errors
    #[error("Command `{command}` failed with {status}")]
    ProcessFailed { command: String, status: String },

    #[error("Git operation failed: {0}")]
    GitError(#[from] git2::Error),

    // Version/parsing errors - automatic conversions via #[from]
    #[error("Invalid version format: {0}")]
    InvalidVersion(#[from] semver::Error),

    #[error("Template rendering failed: {0}")]
    TemplateError(#[from] tera::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML edit error: {0}")]
    TomlEditError(#[from] toml_edit::TomlError),

    #[error("JSON parse error: {0}")]
    JsonParseError(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParseError(#[from] serde_yaml::Error),

    #[error("Regular expression error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Glob pattern error: {0}")]
    GlobError(#[from] glob::PatternError),

    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] log::SetLoggerError),

    // Generic wrapper for other errors
    #[error(transparent)]
    Other(#[from] color_eyre::Report),
}

/// Result type alias using ReleaseError
pub type Result<T> = std::result::Result<T, ReleaseError>;

impl ReleaseError {
    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a missing manifest field error
    pub fn missing_field(path: impl Into<PathBuf>, field: &'static str) -> Self {
        Self::MissingField {
            path: path.into(),
            field,
        }
    }

    /// Create an invalid manifest error
    pub fn invalid_manifest(
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidManifest {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

// I/O errors are reported through `Other`
impl From<std::io::Error> for ReleaseError {
    fn from(err: std::io::Error) -> Self {
        Self::Other(color_eyre::Report::from(err))
    }
}

impl From<tempfile::PathPersistError> for ReleaseError {
    fn from(err: tempfile::PathPersistError) -> Self {
        Self::from(err.error)
    }
}

impl From<glob::GlobError> for ReleaseError {
    fn from(err: glob::GlobError) -> Self {
        Self::Other(color_eyre::Report::from(err))
    }
}

impl From<tokio::task::JoinError> for ReleaseError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Other(color_eyre::Report::from(err))
    }
}

impl From<crate::project::ProjectBuilderError> for ReleaseError {
    fn from(err: crate::project::ProjectBuilderError) -> Self {
        Self::InvalidConfig(format!("project: {err}"))
    }
}

impl From<crate::project::MonorepoProjectBuilderError> for ReleaseError {
    fn from(err: crate::project::MonorepoProjectBuilderError) -> Self {
        Self::InvalidConfig(format!("monorepo: {err}"))
    }
}
