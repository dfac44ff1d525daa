//! `merge-ready` command - evaluate whether a PR can merge now

use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, check, cross};
use crate::cli::{EXIT_ALREADY_MERGED, EXIT_NOT_READY, EXIT_OK, print_json};
use anstream::println;
use merge_gate::error::Result;
use merge_gate::poll::settle_merge_state;
use merge_gate::readiness::{EvaluateOptions, ReadinessVerdict, evaluate};
use merge_gate::types::{MergeState, PrState, PullRequestDetails};
use serde::Serialize;
use tracing::debug;

/// Flags for the merge-ready command
#[derive(Debug, Clone, Copy, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ReadyArgs {
    /// Skip the checks condition
    pub ignore_ci: bool,
    /// Skip the unresolved threads condition
    pub ignore_threads: bool,
    /// Skip the review condition
    pub ignore_reviews: bool,
}

#[derive(Serialize)]
struct ReadyOutput<'a> {
    pr: &'a PullRequestDetails,
    merge_state: Option<&'a MergeState>,
    #[serde(flatten)]
    verdict: Option<&'a ReadinessVerdict>,
    already_merged: bool,
    exit_code: u8,
}

/// Run the merge-ready command
pub async fn run_merge_ready(ctx: &CommandContext, args: ReadyArgs) -> Result<u8> {
    debug!(pr_number = ctx.pr_number, "checking merge readiness");
    let (pr, snapshot) = ctx.fetch_checks().await?;

    if pr.state == PrState::Merged {
        if ctx.json {
            print_json(&ReadyOutput {
                pr: &pr,
                merge_state: None,
                verdict: None,
                already_merged: true,
                exit_code: EXIT_ALREADY_MERGED,
            })?;
        } else {
            println!(
                "{}",
                format!("PR #{} is already merged.", pr.number).muted()
            );
        }
        return Ok(EXIT_ALREADY_MERGED);
    }

    let merge_state = settle_merge_state(
        ctx.platform.as_ref(),
        pr.number,
        &ctx.config.merge_state_policy(),
        &ctx.cancel,
    )
    .await?;

    let options = EvaluateOptions {
        ignore_ci: args.ignore_ci,
        ignore_threads: args.ignore_threads,
        ignore_reviews: args.ignore_reviews,
        ..ctx.config.evaluate_options()
    };
    let verdict = evaluate(&snapshot, &merge_state, &options)?;
    let code = if verdict.ready && pr.state == PrState::Open {
        EXIT_OK
    } else {
        EXIT_NOT_READY
    };

    if ctx.json {
        print_json(&ReadyOutput {
            pr: &pr,
            merge_state: Some(&merge_state),
            verdict: Some(&verdict),
            already_merged: false,
            exit_code: code,
        })?;
        return Ok(code);
    }

    print_verdict(&pr, &verdict);
    Ok(code)
}

/// Print a verdict with itemized reasons.
pub fn print_verdict(pr: &PullRequestDetails, verdict: &ReadinessVerdict) {
    if pr.state == PrState::Closed {
        println!("{} {}", cross(), format!("PR #{} is closed", pr.number).error());
        return;
    }

    if verdict.ready {
        println!(
            "{} {}",
            check(),
            format!("PR #{} is ready to merge", pr.number).success()
        );
        return;
    }

    println!(
        "{} {}",
        cross(),
        format!("PR #{} is not ready to merge:", pr.number).error()
    );
    for reason in &verdict.blocking_reasons {
        println!("  {} {}", "-".muted(), reason.detail);
    }
    if verdict.is_retryable() {
        println!(
            "{}",
            "The platform is still computing mergeability; try again shortly.".muted()
        );
    }
}
