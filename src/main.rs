//! mgate - CI check polling and merge readiness for pull requests
//!
//! ## Commands
//!
//! - `checks`: list a PR's checks, classified
//! - `wait`: poll until the selected checks settle or time out
//! - `check-details`: show one check, optionally with its log
//! - `merge-ready`: evaluate whether the PR can merge now
//! - `auto-merge`: wait for readiness, then merge
//!
//! Exit codes: 0 ready/passed, 1 invalid input, 2 not found or no matching
//! checks, 3 transport/API error, 4 not authenticated, 5 already merged,
//! 6 not mergeable, 130 interrupted.

mod cli;

use anstream::eprintln;
use clap::{ArgAction, Parser, Subcommand};
use cli::automerge::{AutoMergeArgs, run_automerge};
use cli::checks::run_checks;
use cli::context::CommandContext;
use cli::details::run_check_details;
use cli::ready::{ReadyArgs, run_merge_ready};
use cli::style::Stylize;
use cli::wait::{WaitArgs, run_wait};
use cli::GlobalArgs;
use merge_gate::error::Result;
use merge_gate::poll::cancel_pair;
use merge_gate::types::MergeMethod;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "mgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CI check polling and merge readiness for GitHub and GitLab", long_about = None)]
struct Cli {
    /// Repository as owner/name (default: the origin remote)
    #[arg(long, global = true)]
    repo: Option<String>,

    /// Host of a self-hosted GitHub Enterprise or GitLab instance
    #[arg(long, global = true)]
    host: Option<String>,

    /// Config file (default: $XDG_CONFIG_HOME/merge-gate/config.toml)
    #[arg(long, global = true, env = "MERGE_GATE_CONFIG")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the checks of a PR
    Checks {
        /// PR number, owner/repo#N or PR URL
        pr: String,

        /// Only show required checks
        #[arg(long)]
        required: bool,
    },

    /// Wait for checks to finish
    Wait {
        /// PR number, owner/repo#N or PR URL
        pr: String,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Only wait for required checks
        #[arg(long)]
        required: bool,

        /// Initial polling interval in seconds
        #[arg(long)]
        interval: Option<u64>,

        /// Only wait for this check (repeatable)
        #[arg(long = "check", value_name = "NAME")]
        checks: Vec<String>,
    },

    /// Show details for one check
    CheckDetails {
        /// PR number, owner/repo#N or PR URL
        pr: String,

        /// Check name, plain or suite/name
        #[arg(long, value_name = "NAME")]
        check: String,

        /// Include the tail of the job log
        #[arg(long)]
        include_logs: bool,
    },

    /// Check whether a PR can be merged now
    MergeReady {
        /// PR number, owner/repo#N or PR URL
        pr: String,

        /// Ignore CI checks
        #[arg(long)]
        ignore_ci: bool,

        /// Ignore unresolved review threads
        #[arg(long)]
        ignore_threads: bool,

        /// Ignore the review decision
        #[arg(long)]
        ignore_reviews: bool,
    },

    /// Merge a PR as soon as it becomes ready
    AutoMerge {
        /// PR number, owner/repo#N or PR URL
        pr: String,

        /// Merge method
        #[arg(long, value_enum, default_value_t = MergeMethod::Squash)]
        method: MergeMethod,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Ask for confirmation before enabling
        #[arg(long)]
        confirm: bool,
    },
}

impl Commands {
    fn pr(&self) -> &str {
        match self {
            Self::Checks { pr, .. }
            | Self::Wait { pr, .. }
            | Self::CheckDetails { pr, .. }
            | Self::MergeReady { pr, .. }
            | Self::AutoMerge { pr, .. } => pr,
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
}

async fn run(cli: Cli) -> Result<u8> {
    let globals = GlobalArgs {
        repo: cli.repo,
        host: cli.host,
        config: cli.config,
        json: cli.json,
    };

    let (handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let ctx = CommandContext::new(&globals, cli.command.pr(), cancel).await?;

    match cli.command {
        Commands::Checks { required, .. } => run_checks(&ctx, required).await,
        Commands::Wait {
            timeout,
            required,
            interval,
            checks,
            ..
        } => {
            let args = WaitArgs {
                timeout,
                required,
                interval,
                checks,
            };
            run_wait(&ctx, &args).await
        }
        Commands::CheckDetails {
            check,
            include_logs,
            ..
        } => run_check_details(&ctx, &check, include_logs).await,
        Commands::MergeReady {
            ignore_ci,
            ignore_threads,
            ignore_reviews,
            ..
        } => {
            let args = ReadyArgs {
                ignore_ci,
                ignore_threads,
                ignore_reviews,
            };
            run_merge_ready(&ctx, args).await
        }
        Commands::AutoMerge {
            method,
            timeout,
            confirm,
            ..
        } => {
            let args = AutoMergeArgs {
                method,
                timeout,
                confirm,
            };
            run_automerge(&ctx, args).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {e}", "error:".error());
            ExitCode::from(e.exit_code())
        }
    }
}
