//! `wait` command - poll until the selected checks settle

use crate::cli::checks::{CheckRow, check_rows, print_rows};
use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, check, cross};
use crate::cli::{CliProgress, EXIT_NO_MATCH, EXIT_NOT_READY, EXIT_OK, print_json};
use anstream::println;
use merge_gate::error::Result;
use merge_gate::poll::{WaitOutcome, WaitStatus, wait_for_checks};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;

/// Flags for the wait command
#[derive(Debug, Clone, Default)]
pub struct WaitArgs {
    /// Overall timeout in seconds
    pub timeout: Option<u64>,
    /// Only wait for required checks
    pub required: bool,
    /// Initial poll interval in seconds
    pub interval: Option<u64>,
    /// Only wait for these checks
    pub checks: Vec<String>,
}

#[derive(Serialize)]
struct WaitOutput<'a> {
    #[serde(flatten)]
    outcome: &'a WaitOutcome,
    exit_code: u8,
    checks: Vec<CheckRow>,
}

/// Exit code for a finished wait.
pub fn exit_code(outcome: &WaitOutcome) -> u8 {
    match outcome.status {
        WaitStatus::NoMatchingChecks => EXIT_NO_MATCH,
        WaitStatus::Completed if outcome.summary.all_passing() => EXIT_OK,
        WaitStatus::Completed | WaitStatus::TimedOut => EXIT_NOT_READY,
    }
}

/// Run the wait command
pub async fn run_wait(ctx: &CommandContext, args: &WaitArgs) -> Result<u8> {
    let mut options = ctx.config.poll_options();
    if let Some(secs) = args.timeout {
        options.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.interval {
        options.backoff.initial = Duration::from_secs(secs.max(1));
        options.backoff.max = options.backoff.max.max(options.backoff.initial);
    }
    options.required_only = args.required;
    if !args.checks.is_empty() {
        options.names = Some(args.checks.iter().cloned().collect::<BTreeSet<_>>());
    }

    let progress = CliProgress::new(
        &format!("Waiting for checks on PR #{}...", ctx.pr_number),
        !ctx.json,
    );
    let result = wait_for_checks(
        ctx.platform.as_ref(),
        ctx.pr_number,
        &options,
        &ctx.cancel,
        &progress,
    )
    .await;
    progress.finish();
    let outcome = result?;
    let code = exit_code(&outcome);

    let rows: Vec<CheckRow> = check_rows(&outcome.snapshot, false)?
        .into_iter()
        .filter(|row| {
            outcome.summary.passing.contains(&row.name)
                || outcome.summary.failing.contains(&row.name)
                || outcome.summary.pending.contains(&row.name)
        })
        .collect();

    if ctx.json {
        print_json(&WaitOutput {
            outcome: &outcome,
            exit_code: code,
            checks: rows,
        })?;
        return Ok(code);
    }

    match outcome.status {
        WaitStatus::NoMatchingChecks => {
            let what = match (&options.names, options.required_only) {
                (Some(names), _) => format!(
                    "checks named {}",
                    names.iter().cloned().collect::<Vec<_>>().join(", ")
                ),
                (None, true) => "required checks".to_string(),
                (None, false) => "checks".to_string(),
            };
            println!("{}", format!("No matching {what} on PR #{}.", ctx.pr_number).warn());
            return Ok(code);
        }
        WaitStatus::Completed if code == EXIT_OK => println!(
            "{} {}",
            check(),
            format!("All {} check(s) passed", outcome.summary.selected).success()
        ),
        WaitStatus::Completed => println!(
            "{} {}",
            cross(),
            format!("{} check(s) failed", outcome.summary.failing.len()).error()
        ),
        WaitStatus::TimedOut => println!(
            "{} {}",
            cross(),
            format!(
                "Timed out after {}s with {} check(s) still pending",
                options.timeout.as_secs(),
                outcome.summary.pending.len()
            )
            .warn()
        ),
    }
    print_rows(&rows);
    Ok(code)
}
