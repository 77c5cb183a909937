//! Command execution: builds the project from the config file and queues the
//! releaser steps of each subcommand.
use log::*;
use std::path::Path;

use crate::{
    Result,
    cli::{Args, Command},
    config::Config,
    options::{
        CheckoutOptions, CommitOptions, PublishOptions, PushOptions, TagOptions,
    },
    releaser::{IfReleaseCommit, Releaser},
};

pub async fn execute(args: Args) -> Result<()> {
    let config = Config::load(&args.config).await?;
    let root = match args.config.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let (project, git) = config.build(root)?;
    let mut releaser = Releaser::new(project, git).with_dry_run(args.dry_run);
    releaser.set_options(config.steps());

    if args.dry_run {
        info!("dry run: no files, commits, tags or packages will be written");
    }

    match args.command {
        Command::Bump(bump) => {
            releaser
                .bump(bump.into())
                .commit(CommitOptions::default());

            releaser.run().await
        }
        Command::Prepare { branch, bump } => {
            releaser
                .checkout(branch, CheckoutOptions::default())
                .bump(bump.into())
                .commit(CommitOptions::default())
                .push(PushOptions::default());

            releaser.run().await
        }
        Command::Release { publish, bump } => {
            releaser
                .bump(bump.into())
                .commit(CommitOptions::default())
                .tag(TagOptions::default())
                .push(PushOptions::default());

            if publish {
                releaser.publish(PublishOptions::default());
            }

            releaser.run().await
        }
        Command::Publish { no_check } => {
            releaser
                .tag(TagOptions::default())
                .push(PushOptions::default())
                .publish(PublishOptions::default());

            if no_check {
                releaser.run().await
            } else {
                releaser.run_if(&IfReleaseCommit).await
            }
        }
    }
}
