//! Check poller
//!
//! Repeatedly fetches check snapshots until every selected check has settled
//! or a wall-clock deadline passes. Transient fetch failures are retried with
//! their own short backoff, separate from the check-completion backoff.
//! Cancellation is cooperative through [`CancelSignal`].

use crate::classify::{CheckKind, StalePolicy, classify_snapshot};
use crate::error::{Error, Result};
use crate::fetch::fetch_pr_checks;
use crate::platform::PlatformService;
use crate::types::{CheckSnapshot, MergeState, MergeStateStatus, PullRequestDetails};
use serde::Serialize;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// =============================================================================
// Policies
// =============================================================================

/// Longest wall-clock budget a wait or auto-merge run accepts (one week)
pub const MAX_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Deadline `timeout` from now, rejecting budgets above [`MAX_TIMEOUT`].
pub fn deadline_after(timeout: Duration) -> Result<Instant> {
    if timeout > MAX_TIMEOUT {
        return Err(Error::InvalidInput(format!(
            "timeout of {}s exceeds the maximum of {}s",
            timeout.as_secs(),
            MAX_TIMEOUT.as_secs()
        )));
    }
    Instant::now()
        .checked_add(timeout)
        .ok_or_else(|| {
            Error::InvalidInput(format!("timeout of {}s is out of range", timeout.as_secs()))
        })
}

/// Exponential backoff between poll ticks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first tick
    pub initial: Duration,
    /// Upper bound for any delay
    pub max: Duration,
    /// Growth factor per tick (values below 1.0 are treated as 1.0)
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(60),
            multiplier: 1.5,
        }
    }
}

impl BackoffPolicy {
    /// Constant interval, no growth.
    pub const fn fixed(interval: Duration) -> Self {
        Self {
            initial: interval,
            max: interval,
            multiplier: 1.0,
        }
    }

    /// Delay after the given tick (1-based).
    #[must_use]
    pub fn delay_for_tick(&self, tick: u32) -> Duration {
        grow(self.initial, self.max, self.multiplier, tick)
    }
}

/// Bounded retry for transient fetch failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay after the first failure; doubles afterwards
    pub initial_delay: Duration,
    /// Upper bound for any delay, including server hints
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given failed attempt (1-based).
    ///
    /// A `retry_after` hint from a rate limit takes precedence.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32, error: &Error) -> Duration {
        if let Error::RateLimited {
            retry_after: Some(hint),
        } = error
        {
            return (*hint).min(self.max_delay);
        }
        grow(self.initial_delay, self.max_delay, 2.0, attempt)
    }
}

fn grow(initial: Duration, max: Duration, multiplier: f64, step: u32) -> Duration {
    let exponent = i32::try_from(step.saturating_sub(1)).unwrap_or(i32::MAX);
    let secs = initial.as_secs_f64() * multiplier.max(1.0).powi(exponent);
    if !secs.is_finite() || secs >= max.as_secs_f64() {
        return max;
    }
    Duration::from_secs_f64(secs)
}

/// Re-fetch policy while the platform reports an `unknown` merge state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeStatePolicy {
    /// Fetches before giving up and returning the unknown state
    pub max_attempts: u32,
    /// Delay between fetches
    pub interval: Duration,
    /// Retry policy for each individual fetch
    pub retry: RetryPolicy,
}

impl Default for MergeStatePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_secs(2),
            retry: RetryPolicy::default(),
        }
    }
}

// =============================================================================
// Cancellation
// =============================================================================

/// Sending half of a cancellation pair
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Signal cancellation to every linked [`CancelSignal`].
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Receiving half of a cancellation pair, cheap to clone
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self(rx)
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if the handle
    /// was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.0.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Create a linked cancel handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelSignal(rx))
}

/// Sleep for `duration` unless cancelled first.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancelSignal) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    tokio::select! {
        () = tokio::time::sleep(duration) => Ok(()),
        () = cancel.cancelled() => Err(Error::Cancelled),
    }
}

// =============================================================================
// Progress reporting
// =============================================================================

/// Settled/unsettled counts for the selected checks of one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionSummary {
    /// Checks matching the selection
    pub selected: usize,
    /// Selected checks that settled as passing
    pub passing: Vec<String>,
    /// Selected checks that settled as failing, cancelled or blocked
    pub failing: Vec<String>,
    /// Selected checks still waiting to settle
    pub pending: Vec<String>,
}

impl SelectionSummary {
    /// Every selected check has settled.
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }

    /// Every selected check settled and none failed.
    pub fn all_passing(&self) -> bool {
        self.selected > 0 && self.pending.is_empty() && self.failing.is_empty()
    }
}

/// Callback invoked by the poller; all methods default to no-ops
pub trait PollObserver: Send + Sync {
    /// A snapshot was fetched and summarized.
    fn on_tick(&self, _tick: u32, _snapshot: &CheckSnapshot, _summary: &SelectionSummary) {}

    /// A transient fetch failure will be retried after `delay`.
    fn on_retry(&self, _attempt: u32, _error: &Error, _delay: Duration) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PollObserver for NoopObserver {}

// =============================================================================
// Wait
// =============================================================================

/// Options for one `wait_for_checks` session
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Wall-clock budget for the whole session
    pub timeout: Duration,
    /// Delay growth between ticks
    pub backoff: BackoffPolicy,
    /// Transient fetch retry budget
    pub retry: RetryPolicy,
    /// Only consider required checks
    pub required_only: bool,
    /// Only consider checks matching one of these names (plain or `suite/name`)
    pub names: Option<BTreeSet<String>>,
    /// How unsuperseded stale checks count
    pub stale_policy: StalePolicy,
    /// Count cancelled checks as passing
    pub ignore_cancelled: bool,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            backoff: BackoffPolicy::default(),
            retry: RetryPolicy::default(),
            required_only: false,
            names: None,
            stale_policy: StalePolicy::default(),
            ignore_cancelled: false,
        }
    }
}

/// How a wait session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStatus {
    /// Every selected check settled
    Completed,
    /// The deadline passed first; the snapshot is the last one observed
    TimedOut,
    /// The selection matched no checks at all
    NoMatchingChecks,
}

/// Result of a wait session
#[derive(Debug, Clone, Serialize)]
pub struct WaitOutcome {
    /// PR as of the last tick
    pub pr: PullRequestDetails,
    /// Last snapshot observed
    pub snapshot: CheckSnapshot,
    /// Why the session ended
    pub status: WaitStatus,
    /// Summary of the selected checks in `snapshot`
    pub summary: SelectionSummary,
    /// Number of fetch ticks performed
    pub ticks: u32,
}

impl WaitOutcome {
    /// Whether the deadline passed before the checks settled.
    pub fn timed_out(&self) -> bool {
        self.status == WaitStatus::TimedOut
    }
}

/// Summarize the checks of a snapshot that a selection picks out.
///
/// `required_only` and `names` both narrow the selection when set.
/// Superseded stale runs are never selected.
pub fn summarize(snapshot: &CheckSnapshot, options: &PollOptions) -> Result<SelectionSummary> {
    let classified = classify_snapshot(&snapshot.runs)?;
    let mut summary = SelectionSummary::default();

    let selected = classified.iter().filter(|c| {
        !c.superseded
            && (!options.required_only || c.run.is_required)
            && options
                .names
                .as_ref()
                .is_none_or(|names| names.iter().any(|n| c.run.matches_name(n)))
    });

    for check in selected {
        summary.selected += 1;
        let name = snapshot.display_name(check.run);
        if !check.is_settled(options.stale_policy) {
            summary.pending.push(name);
            continue;
        }
        match check.kind {
            CheckKind::Passing | CheckKind::Stale => summary.passing.push(name),
            CheckKind::Cancelled if options.ignore_cancelled => summary.passing.push(name),
            CheckKind::Failing | CheckKind::Cancelled | CheckKind::Blocked => {
                summary.failing.push(name);
            }
            CheckKind::Pending => summary.pending.push(name),
        }
    }

    Ok(summary)
}

/// Run `op` until it succeeds, fails permanently, or exhausts the retry budget.
///
/// Only transient errors are retried; exhaustion surfaces as
/// [`Error::FetchExhausted`] wrapping the last failure.
pub async fn fetch_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancelSignal,
    observer: &dyn PollObserver,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                if attempt >= max_attempts {
                    return Err(Error::FetchExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                let delay = policy.delay_for_attempt(attempt, &e);
                warn!(attempt, delay_ms = delay.as_millis(), error = %e, "transient fetch failure, retrying");
                observer.on_retry(attempt, &e, delay);
                sleep_or_cancel(delay, cancel).await?;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Poll a PR's checks until the selection settles or the deadline passes.
///
/// The first fetch happens immediately. Timing out is an outcome, not an
/// error; fetch failures past the retry budget and cancellation are errors.
pub async fn wait_for_checks(
    platform: &dyn PlatformService,
    pr_number: u64,
    options: &PollOptions,
    cancel: &CancelSignal,
    observer: &dyn PollObserver,
) -> Result<WaitOutcome> {
    let deadline = deadline_after(options.timeout)?;
    let mut ticks = 0;

    info!(pr_number, timeout_secs = options.timeout.as_secs(), "waiting for checks");

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        ticks += 1;

        let (pr, snapshot) = fetch_with_retry(&options.retry, cancel, observer, move || {
            fetch_pr_checks(platform, pr_number)
        })
        .await?;
        let summary = summarize(&snapshot, options)?;
        observer.on_tick(ticks, &snapshot, &summary);

        debug!(
            pr_number,
            tick = ticks,
            selected = summary.selected,
            pending = summary.pending.len(),
            failing = summary.failing.len(),
            "poll tick"
        );

        let status = if summary.selected == 0 {
            Some(WaitStatus::NoMatchingChecks)
        } else if summary.is_settled() {
            Some(WaitStatus::Completed)
        } else if Instant::now() >= deadline {
            Some(WaitStatus::TimedOut)
        } else {
            None
        };

        if let Some(status) = status {
            info!(pr_number, ?status, ticks, "wait finished");
            return Ok(WaitOutcome {
                pr,
                snapshot,
                status,
                summary,
                ticks,
            });
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let delay = options.backoff.delay_for_tick(ticks).min(remaining);
        sleep_or_cancel(delay, cancel).await?;
    }
}

/// Fetch the merge state, re-fetching while the platform is still computing.
///
/// Returns the last state observed; if it is still `unknown` after the
/// attempt budget the evaluator reports it as computing.
pub async fn settle_merge_state(
    platform: &dyn PlatformService,
    pr_number: u64,
    policy: &MergeStatePolicy,
    cancel: &CancelSignal,
) -> Result<MergeState> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let state = fetch_with_retry(&policy.retry, cancel, &NoopObserver, move || {
            platform.get_merge_state(pr_number)
        })
        .await?;

        if state.status != MergeStateStatus::Unknown || attempt >= max_attempts {
            return Ok(state);
        }

        debug!(pr_number, attempt, "merge state unknown, re-fetching");
        sleep_or_cancel(policy.interval, cancel).await?;
        attempt += 1;
    }
}
