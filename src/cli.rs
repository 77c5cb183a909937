//! CLI argument parsing.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::{config::DEFAULT_CONFIG_FILE, options::BumpOptions, version::ReleaseType};

/// Global CLI arguments.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(long, default_value_t = false, global = true)]
    /// Enable debug logging.
    pub debug: bool,

    #[arg(long, default_value_t = false, global = true)]
    /// Log every step without touching files, git or the registry.
    pub dry_run: bool,

    #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    /// Config file. Its directory is the root of the project paths.
    pub config: PathBuf,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Release subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bump versions, update changelogs and commit the changes.
    Bump(BumpArgs),

    /// Bump on a release branch and push it.
    Prepare {
        /// Release branch (default: simple-release).
        #[arg(long)]
        branch: Option<String>,

        #[command(flatten)]
        bump: BumpArgs,
    },

    /// Bump, commit, tag and push in one go.
    Release {
        /// Publish to the registry after pushing.
        #[arg(long, default_value_t = false)]
        publish: bool,

        #[command(flatten)]
        bump: BumpArgs,
    },

    /// Tag, push and publish the release commit at HEAD.
    Publish {
        /// Run even when HEAD is not an untagged release commit.
        #[arg(long, default_value_t = false)]
        no_check: bool,
    },
}

/// Version overrides shared by the bumping subcommands.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct BumpArgs {
    /// Release exactly this version.
    #[arg(long = "version")]
    pub next_version: Option<String>,

    /// Release type to apply instead of analyzing commits.
    #[arg(long = "as", value_enum)]
    pub release_as: Option<ReleaseType>,

    /// Prerelease identifier, e.g. alpha.
    #[arg(long)]
    pub prerelease: Option<String>,

    /// Release the current manifest version as is.
    #[arg(long, default_value_t = false)]
    pub first_release: bool,

    /// Bump private projects and unchanged monorepo packages too.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

impl From<BumpArgs> for BumpOptions {
    /// Flags left off stay unset so config values apply.
    fn from(args: BumpArgs) -> Self {
        BumpOptions {
            version: args.next_version,
            release_as: args.release_as,
            prerelease: args.prerelease,
            first_release: args.first_release.then_some(true),
            force: args.force.then_some(true),
            ..Default::default()
        }
    }
}
