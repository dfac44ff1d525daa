//! `auto-merge` command - wait for readiness, then merge

use crate::cli::context::CommandContext;
use crate::cli::ready::print_verdict;
use crate::cli::style::{Stylize, check, cross};
use crate::cli::{CliProgress, EXIT_ALREADY_MERGED, EXIT_NOT_READY, EXIT_OK, print_json};
use anstream::println;
use dialoguer::Confirm;
use merge_gate::automerge::{AutoMerge, AutoMergeOptions, AutoMergeOutcome, AutoMergeState, run_auto_merge};
use merge_gate::error::{Error, Result};
use merge_gate::types::{MergeMethod, PrState};
use serde::Serialize;
use std::time::Duration;

/// Flags for the auto-merge command
#[derive(Debug, Clone, Copy)]
pub struct AutoMergeArgs {
    /// Merge method
    pub method: MergeMethod,
    /// Overall timeout in seconds
    pub timeout: Option<u64>,
    /// Ask before enabling
    pub confirm: bool,
}

#[derive(Serialize)]
struct AutoMergeOutput<'a> {
    #[serde(flatten)]
    outcome: Option<&'a AutoMergeOutcome>,
    machine: &'a AutoMerge,
    already_merged: bool,
    exit_code: u8,
}

/// Exit code for a finished run.
pub const fn exit_code(outcome: &AutoMergeOutcome) -> u8 {
    match outcome.state {
        AutoMergeState::Merged => EXIT_OK,
        _ => EXIT_NOT_READY,
    }
}

/// Run the auto-merge command
pub async fn run_automerge(ctx: &CommandContext, args: AutoMergeArgs) -> Result<u8> {
    let pr = ctx.fetch_pr().await?;
    let mut machine = AutoMerge::new();

    if pr.state == PrState::Merged {
        if ctx.json {
            print_json(&AutoMergeOutput {
                outcome: None,
                machine: &machine,
                already_merged: true,
                exit_code: EXIT_ALREADY_MERGED,
            })?;
        } else {
            println!("{}", format!("PR #{} is already merged.", pr.number).muted());
        }
        return Ok(EXIT_ALREADY_MERGED);
    }

    if args.confirm {
        println!(
            "Auto-merge PR #{} {} into {} using {}",
            pr.number,
            pr.title.emphasis(),
            pr.base_ref.accent(),
            args.method.to_string().accent()
        );
        if !Confirm::new()
            .with_prompt("Enable auto-merge?")
            .default(true)
            .interact()
            .map_err(|e| Error::Internal(format!("Failed to read confirmation: {e}")))?
        {
            println!("{}", "Aborted".muted());
            return Ok(EXIT_NOT_READY);
        }
    }

    let options = AutoMergeOptions {
        method: args.method,
        timeout: args
            .timeout
            .map_or_else(|| ctx.config.timeout(), Duration::from_secs),
        backoff: ctx.config.backoff(),
        retry: ctx.config.retry(),
        merge_state: ctx.config.merge_state_policy(),
        evaluate: ctx.config.evaluate_options(),
    };

    let progress = CliProgress::new(
        &format!("Auto-merge enabled for PR #{}, waiting...", pr.number),
        !ctx.json,
    );
    let result = run_auto_merge(
        ctx.platform.as_ref(),
        pr.number,
        &mut machine,
        &options,
        &ctx.cancel,
        &progress,
    )
    .await;
    progress.finish();
    let outcome = result?;
    let code = exit_code(&outcome);

    if ctx.json {
        print_json(&AutoMergeOutput {
            outcome: Some(&outcome),
            machine: &machine,
            already_merged: false,
            exit_code: code,
        })?;
        return Ok(code);
    }

    for t in machine.history() {
        println!(
            "  {} {} {} {}",
            t.at.format("%H:%M:%S").to_string().muted(),
            t.from,
            "→".muted(),
            format!("{} ({})", t.to, t.trigger).accent()
        );
    }

    match outcome.state {
        AutoMergeState::Merged => {
            let sha = outcome
                .merge
                .as_ref()
                .and_then(|m| m.sha.as_deref())
                .map(|s| s.get(..7).unwrap_or(s).to_string());
            println!(
                "{} {}{}",
                check(),
                format!("Merged PR #{}", pr.number).success(),
                sha.map(|s| format!(" as {s}").muted()).unwrap_or_default()
            );
        }
        AutoMergeState::Cancelled => {
            let why = machine
                .last_transition()
                .map(|t| t.trigger.to_string())
                .unwrap_or_default();
            println!(
                "{} {}",
                cross(),
                format!("Auto-merge cancelled: {why}").error()
            );
        }
        _ if outcome.timed_out => {
            println!(
                "{} {}",
                cross(),
                format!("Timed out after {}s", options.timeout.as_secs()).warn()
            );
            if let Some(verdict) = &outcome.verdict {
                print_verdict(&outcome.pr, verdict);
            }
        }
        state => println!("{}", format!("Auto-merge ended in state '{state}'").muted()),
    }
    Ok(code)
}
