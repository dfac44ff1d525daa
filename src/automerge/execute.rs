//! Auto-merge execution - effectful driver
//!
//! Each cycle observes the PR, feeds watcher events into the state machine,
//! evaluates readiness on a fresh snapshot and performs the merge when the
//! machine asks for it. Ends when the machine leaves `Enabled`, the merge
//! lands, or the deadline passes.

use super::state::{AutoMerge, AutoMergeState, EnableContext};
use super::watch::{Observation, detect_events};
use crate::error::{Error, Result};
use crate::fetch::fetch_check_snapshot;
use crate::platform::PlatformService;
use crate::poll::{
    BackoffPolicy, CancelSignal, MergeStatePolicy, NoopObserver, PollObserver, PollOptions,
    RetryPolicy, deadline_after, fetch_with_retry, settle_merge_state, sleep_or_cancel, summarize,
};
use crate::readiness::{EvaluateOptions, ReadinessVerdict, evaluate};
use crate::types::{MergeMethod, MergeResult, PullRequestDetails};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Options for an auto-merge run
#[derive(Debug, Clone)]
pub struct AutoMergeOptions {
    /// Merge method used when enabling
    pub method: MergeMethod,
    /// Wall-clock budget for the whole run
    pub timeout: Duration,
    /// Delay growth between cycles
    pub backoff: BackoffPolicy,
    /// Transient fetch retry budget
    pub retry: RetryPolicy,
    /// Re-fetch policy for `unknown` merge states
    pub merge_state: MergeStatePolicy,
    /// Readiness relaxations
    pub evaluate: EvaluateOptions,
}

impl Default for AutoMergeOptions {
    fn default() -> Self {
        Self {
            method: MergeMethod::Squash,
            timeout: Duration::from_secs(600),
            backoff: BackoffPolicy::default(),
            retry: RetryPolicy::default(),
            merge_state: MergeStatePolicy::default(),
            evaluate: EvaluateOptions::default(),
        }
    }
}

/// How an auto-merge run ended
#[derive(Debug, Clone, Serialize)]
pub struct AutoMergeOutcome {
    /// Machine state at the end of the run
    pub state: AutoMergeState,
    /// PR as last observed
    pub pr: PullRequestDetails,
    /// Last readiness verdict, if one was computed
    pub verdict: Option<ReadinessVerdict>,
    /// Result of the last merge attempt, if any
    pub merge: Option<MergeResult>,
    /// The deadline passed while still enabled
    pub timed_out: bool,
    /// Number of observe/evaluate cycles
    pub cycles: u32,
}

async fn observe(
    platform: &dyn PlatformService,
    pr_number: u64,
    options: &AutoMergeOptions,
    cancel: &CancelSignal,
) -> Result<Observation> {
    let pr = fetch_with_retry(&options.retry, cancel, &NoopObserver, move || {
        platform.get_pr_details(pr_number)
    })
    .await?;
    let merge_state = settle_merge_state(platform, pr_number, &options.merge_state, cancel).await?;
    Ok(Observation { pr, merge_state })
}

/// Enable auto-merge (unless already enabled) and drive it to an end state.
///
/// Cancellation returns `Error::Cancelled` and leaves the machine as it was.
pub async fn run_auto_merge(
    platform: &dyn PlatformService,
    pr_number: u64,
    machine: &mut AutoMerge,
    options: &AutoMergeOptions,
    cancel: &CancelSignal,
    observer: &dyn PollObserver,
) -> Result<AutoMergeOutcome> {
    let deadline = deadline_after(options.timeout)?;
    let mut prev = observe(platform, pr_number, options, cancel).await?;

    if machine.state() != AutoMergeState::Enabled {
        let base = prev.pr.base_ref.as_str();
        let protection = fetch_with_retry(&options.retry, cancel, observer, move || {
            platform.get_branch_protection(base)
        })
        .await?;
        machine.enable(
            options.method,
            &EnableContext {
                pr: &prev.pr,
                protection: protection.as_ref(),
            },
        )?;
    }

    let summary_options = PollOptions {
        required_only: true,
        stale_policy: options.evaluate.stale_policy,
        ignore_cancelled: options.evaluate.ignore_cancelled,
        ..PollOptions::default()
    };

    let mut cycles = 0;
    let mut verdict = None;
    let mut merge = None;
    let mut timed_out = false;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        cycles += 1;

        if cycles > 1 {
            let current = observe(platform, pr_number, options, cancel).await?;
            for event in detect_events(&prev, &current) {
                if let Some(t) = machine.observe(event) {
                    warn!(pr_number, to = %t.to, trigger = %t.trigger, "auto-merge state changed by event");
                }
            }
            prev = current;
        }
        if machine.state() != AutoMergeState::Enabled {
            break;
        }

        let pr = &prev.pr;
        let snapshot = fetch_with_retry(&options.retry, cancel, observer, move || {
            fetch_check_snapshot(platform, pr)
        })
        .await?;
        observer.on_tick(cycles, &snapshot, &summarize(&snapshot, &summary_options)?);

        let current_verdict = evaluate(&snapshot, &prev.merge_state, &options.evaluate)?;
        debug!(
            pr_number,
            cycle = cycles,
            ready = current_verdict.ready,
            reasons = current_verdict.blocking_reasons.len(),
            "auto-merge cycle"
        );

        if let Some(action) = machine.on_verdict(&current_verdict) {
            info!(pr_number, method = %action.method, "PR is ready, merging");
            let result = platform.merge_pr(pr_number, action.method).await;
            machine.record_merge(&result)?;
            match result {
                Ok(result) => merge = Some(result),
                Err(e @ (Error::Unauthenticated(_) | Error::NotFound(_))) => return Err(e),
                Err(e) => warn!(pr_number, error = %e, "merge attempt failed, will retry"),
            }
        }
        verdict = Some(current_verdict);

        if machine.state() == AutoMergeState::Merged {
            break;
        }
        if Instant::now() >= deadline {
            timed_out = true;
            break;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        sleep_or_cancel(options.backoff.delay_for_tick(cycles).min(remaining), cancel).await?;
    }

    info!(pr_number, state = %machine.state(), cycles, timed_out, "auto-merge finished");
    Ok(AutoMergeOutcome {
        state: machine.state(),
        pr: prev.pr,
        verdict,
        merge,
        timed_out,
        cycles,
    })
}
