// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use anvil::{
    env::{Environment, SystemEnv},
    flow::{PushOutcome, SyncOutcome},
    git::{Deadline, SystemRunner},
    path::home_dir,
    privacy::HttpProbe,
    ui::{FixedAnswer, InquirePrompter, Prompter, TerminalSink},
    AnvilError, Session, SettingsStore, Target,
};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(about, subcommand_help_heading = "Commands", version)]
struct Cli {
    /// Use settings file at target path instead of ~/.anvil/settings.toml.
    #[arg(long, global = true, value_name = "path")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn open_store(&self, env: &dyn Environment) -> Result<SettingsStore> {
        let store = match &self.settings {
            Some(path) => SettingsStore::new(path, home_dir(env)?),
            None => SettingsStore::from_env(env)?,
        };

        Ok(store)
    }

    async fn run(self, store: &SettingsStore, env: &dyn Environment) -> Result<()> {
        if !store.exists() {
            store
                .ensure_defaults(&SystemRunner, Deadline::default())
                .await?;
            warn!("created default settings at {}", store.path().display());
            warn!("set github.config_repo in that file before pulling or pushing");
        }

        match self.command {
            Command::Config(ConfigCommand::Pull(opts)) => run_pull(opts, store, env).await,
            Command::Config(ConfigCommand::Push(opts)) => run_push(opts, store, env).await,
            Command::Config(ConfigCommand::Sync(opts)) => run_sync(opts, store, env).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Synchronize configuration through the configuration repository.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Pull app configuration from repository into staging.
    #[command(override_usage = "anvil config pull [options] [app]")]
    Pull(PullOptions),

    /// Push local app configuration to a new branch of repository.
    #[command(override_usage = "anvil config push [options] [app]")]
    Push(PushOptions),

    /// Apply staged app configuration to its local path.
    #[command(override_usage = "anvil config sync [options] [app]")]
    Sync(SyncOptions),
}

#[derive(Args, Clone, Debug)]
struct PullOptions {
    /// Name of app to pull, defaults to anvil settings.
    #[arg(value_name = "app")]
    pub app: Option<String>,

    /// Validate repository without cloning or staging anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Args, Clone, Debug)]
struct PushOptions {
    /// Name of app to push, defaults to anvil settings.
    #[arg(value_name = "app")]
    pub app: Option<String>,

    /// Show preview without creating a branch or pushing.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Answer yes to confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,

    /// Print settings document as sync filtering would share it, then stop.
    #[arg(long)]
    pub show_filtered: bool,
}

#[derive(Args, Clone, Debug)]
struct SyncOptions {
    /// Name of app to sync, defaults to anvil settings.
    #[arg(value_name = "app")]
    pub app: Option<String>,

    /// List files that would be written without touching anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Answer yes to confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    let cli = Cli::parse();
    let env = SystemEnv;
    let store = match cli.open_store(&env) {
        Ok(store) => store,
        Err(error) => {
            report(&error, None);
            exit(1);
        }
    };

    if let Err(error) = cli.run(&store, &env).await {
        report(&error, Some(store.path()));
        exit(1);
    }

    exit(0)
}

fn report(error: &anyhow::Error, settings: Option<&Path>) {
    error!("{error}");
    for cause in error.chain().skip(1) {
        error!("  caused by: {cause}");
    }

    if let Some(hint) = error.downcast_ref::<AnvilError>().and_then(AnvilError::hint) {
        info!("hint: {hint}");
    }

    if let Some(path) = settings {
        info!("settings file: {}", path.display());
    }
}

fn prompter(yes: bool) -> Box<dyn Prompter> {
    match yes {
        true => Box::new(FixedAnswer::yes()),
        false => Box::new(InquirePrompter),
    }
}

async fn run_pull(opts: PullOptions, store: &SettingsStore, env: &dyn Environment) -> Result<()> {
    let target = Target::parse(opts.app.as_deref())?;
    let sink = TerminalSink;
    let prompter = prompter(false);
    let session = Session::new(store, SystemRunner, HttpProbe::new(), env, &sink, prompter.as_ref())
        .dry_run(opts.dry_run);

    session.pull(&target).await?;
    Ok(())
}

async fn run_push(opts: PushOptions, store: &SettingsStore, env: &dyn Environment) -> Result<()> {
    let target = Target::parse(opts.app.as_deref())?;
    let sink = TerminalSink;
    let prompter = prompter(opts.yes);
    let session = Session::new(store, SystemRunner, HttpProbe::new(), env, &sink, prompter.as_ref())
        .dry_run(opts.dry_run);

    if opts.show_filtered {
        session.show_filtered()?;
        return Ok(());
    }

    match session.push(&target).await? {
        PushOutcome::Pushed(result) => info!("pushed {} file(s)", result.files_committed.len()),
        PushOutcome::UpToDate | PushOutcome::Declined | PushOutcome::DryRun(_) => {}
    }

    Ok(())
}

async fn run_sync(opts: SyncOptions, store: &SettingsStore, env: &dyn Environment) -> Result<()> {
    let target = Target::parse(opts.app.as_deref())?;
    let sink = TerminalSink;
    let prompter = prompter(opts.yes);
    let session = Session::new(store, SystemRunner, HttpProbe::new(), env, &sink, prompter.as_ref())
        .dry_run(opts.dry_run);

    match session.sync(&target).await? {
        SyncOutcome::Synced(report) => info!("rollback copy kept at {}", report.archive_dir.display()),
        SyncOutcome::Declined { archive_dir } => {
            info!("nothing changed, empty archive left at {}", archive_dir.display())
        }
        SyncOutcome::DryRun { .. } => {}
    }

    Ok(())
}
