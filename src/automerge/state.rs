//! Auto-merge state machine - pure, no I/O
//!
//! Every state change is recorded as a [`Transition`] so a caller can tell
//! "never enabled" apart from "enabled, then silently cancelled".

use crate::error::{Error, Result};
use crate::readiness::ReadinessVerdict;
use crate::types::{BranchProtection, MergeMethod, MergeResult, PrState, PullRequestDetails};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Lifecycle state of an auto-merge request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoMergeState {
    /// Never enabled
    Disabled,
    /// Waiting for the PR to become ready
    Enabled,
    /// The PR was merged
    Merged,
    /// Cancelled implicitly by an external event; may be re-enabled
    Cancelled,
    /// Explicitly disabled by the user
    DisabledByUser,
}

impl AutoMergeState {
    /// No further transitions are possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Merged | Self::DisabledByUser)
    }
}

impl fmt::Display for AutoMergeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disabled => "disabled",
            Self::Enabled => "enabled",
            Self::Merged => "merged",
            Self::Cancelled => "cancelled",
            Self::DisabledByUser => "disabled by user",
        };
        f.write_str(s)
    }
}

/// External change that affects an enabled auto-merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AutoMergeEvent {
    /// The PR now targets a different base branch
    BaseRetargeted {
        /// Previous base branch
        from: String,
        /// New base branch
        to: String,
    },
    /// New commits were pushed to the head branch
    HeadPushed {
        /// Previous head commit
        from: String,
        /// New head commit
        to: String,
    },
    /// The PR was closed without merging
    Closed,
    /// A previously given approval is no longer in effect
    ApprovalDismissed,
    /// The PR was merged by someone or something else
    MergedExternally,
}

impl fmt::Display for AutoMergeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BaseRetargeted { from, to } => write!(f, "base changed from {from} to {to}"),
            Self::HeadPushed { from, to } => {
                write!(f, "new commits pushed ({} -> {})", short_sha(from), short_sha(to))
            }
            Self::Closed => write!(f, "PR closed"),
            Self::ApprovalDismissed => write!(f, "approval dismissed"),
            Self::MergedExternally => write!(f, "merged outside auto-merge"),
        }
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

/// What caused a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum TransitionTrigger {
    /// `enable` was called
    Enable {
        /// Requested merge method
        method: MergeMethod,
    },
    /// `disable` was called
    Disable,
    /// An external event was observed
    Event {
        /// The event
        event: AutoMergeEvent,
    },
    /// The merge action succeeded
    MergeSucceeded {
        /// Merge commit, when reported
        sha: Option<String>,
    },
}

impl fmt::Display for TransitionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enable { method } => write!(f, "enabled ({method})"),
            Self::Disable => write!(f, "disabled"),
            Self::Event { event } => write!(f, "{event}"),
            Self::MergeSucceeded { sha: Some(sha) } => write!(f, "merged as {}", short_sha(sha)),
            Self::MergeSucceeded { sha: None } => write!(f, "merged"),
        }
    }
}

/// One audited state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    /// State before
    pub from: AutoMergeState,
    /// State after
    pub to: AutoMergeState,
    /// Cause
    pub trigger: TransitionTrigger,
    /// When it happened
    pub at: DateTime<Utc>,
}

/// Facts `enable` checks before allowing the transition
#[derive(Debug, Clone, Copy)]
pub struct EnableContext<'a> {
    /// Current PR details
    pub pr: &'a PullRequestDetails,
    /// Protection of the PR's base branch
    pub protection: Option<&'a BranchProtection>,
}

/// A merge the caller must now perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeAction {
    /// Method to merge with
    pub method: MergeMethod,
}

/// Auto-merge state machine for one PR
#[derive(Debug, Clone, Serialize)]
pub struct AutoMerge {
    state: AutoMergeState,
    method: Option<MergeMethod>,
    merge_in_flight: bool,
    history: Vec<Transition>,
}

impl Default for AutoMerge {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoMerge {
    /// A machine in the `Disabled` state with an empty history.
    pub const fn new() -> Self {
        Self {
            state: AutoMergeState::Disabled,
            method: None,
            merge_in_flight: false,
            history: Vec::new(),
        }
    }

    /// Current state
    pub const fn state(&self) -> AutoMergeState {
        self.state
    }

    /// Method chosen at the last `enable`
    pub const fn method(&self) -> Option<MergeMethod> {
        self.method
    }

    /// All transitions, oldest first
    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// The most recent transition, if any
    pub fn last_transition(&self) -> Option<&Transition> {
        self.history.last()
    }

    /// Enable auto-merge.
    ///
    /// Allowed from `Disabled` and `Cancelled`; a no-op when already enabled.
    /// Fails with `PreconditionFailed` when the PR is not open or its base
    /// branch has no protection.
    pub fn enable(&mut self, method: MergeMethod, ctx: &EnableContext<'_>) -> Result<()> {
        match self.state {
            AutoMergeState::Enabled => return Ok(()),
            AutoMergeState::Merged | AutoMergeState::DisabledByUser => {
                return Err(Error::InvalidTransition(format!(
                    "cannot enable auto-merge from '{}'",
                    self.state
                )));
            }
            AutoMergeState::Disabled | AutoMergeState::Cancelled => {}
        }

        match ctx.pr.state {
            PrState::Open => {}
            PrState::Merged => {
                return Err(Error::PreconditionFailed(format!(
                    "PR #{} is already merged",
                    ctx.pr.number
                )));
            }
            PrState::Closed => {
                return Err(Error::PreconditionFailed(format!(
                    "PR #{} is closed",
                    ctx.pr.number
                )));
            }
        }

        if ctx.protection.is_none() {
            return Err(Error::PreconditionFailed(format!(
                "base branch '{}' has no protection rules; auto-merge requires at least one",
                ctx.pr.base_ref
            )));
        }

        self.method = Some(method);
        self.merge_in_flight = false;
        self.transition(AutoMergeState::Enabled, TransitionTrigger::Enable { method });
        Ok(())
    }

    /// Explicitly disable auto-merge.
    ///
    /// Idempotent when not enabled; disabling after a merge is an error.
    pub fn disable(&mut self) -> Result<()> {
        match self.state {
            AutoMergeState::Enabled => {
                self.merge_in_flight = false;
                self.transition(AutoMergeState::DisabledByUser, TransitionTrigger::Disable);
                Ok(())
            }
            AutoMergeState::Merged => Err(Error::InvalidTransition(
                "cannot disable auto-merge after the PR merged".to_string(),
            )),
            AutoMergeState::Disabled | AutoMergeState::Cancelled | AutoMergeState::DisabledByUser => {
                Ok(())
            }
        }
    }

    /// React to an external event. Returns the transition it caused, if any.
    pub fn observe(&mut self, event: AutoMergeEvent) -> Option<&Transition> {
        let next = match (&event, self.state) {
            (_, state) if state.is_terminal() => return None,
            (AutoMergeEvent::MergedExternally, _) => AutoMergeState::Merged,
            (_, AutoMergeState::Enabled) => AutoMergeState::Cancelled,
            _ => {
                debug!(state = %self.state, %event, "event ignored");
                return None;
            }
        };

        self.merge_in_flight = false;
        self.transition(next, TransitionTrigger::Event { event });
        self.history.last()
    }

    /// Feed a fresh readiness verdict.
    ///
    /// Returns a merge action when enabled and ready, at most once until the
    /// outcome is reported through [`record_merge`](Self::record_merge).
    pub fn on_verdict(&mut self, verdict: &ReadinessVerdict) -> Option<MergeAction> {
        if self.state != AutoMergeState::Enabled || !verdict.ready || self.merge_in_flight {
            return None;
        }
        let method = self.method?;
        self.merge_in_flight = true;
        Some(MergeAction { method })
    }

    /// Record the outcome of the merge action.
    ///
    /// Success moves to `Merged`; any failure leaves the machine `Enabled` so
    /// the next ready verdict can retry.
    pub fn record_merge(&mut self, outcome: &Result<MergeResult>) -> Result<()> {
        if !self.merge_in_flight {
            return Err(Error::InvalidTransition(
                "no merge action is outstanding".to_string(),
            ));
        }
        self.merge_in_flight = false;

        match outcome {
            Ok(result) if result.merged => {
                self.transition(
                    AutoMergeState::Merged,
                    TransitionTrigger::MergeSucceeded {
                        sha: result.sha.clone(),
                    },
                );
            }
            Ok(result) => {
                info!(message = ?result.message, "merge not performed, staying enabled");
            }
            Err(e) => {
                info!(error = %e, "merge failed, staying enabled");
            }
        }
        Ok(())
    }

    fn transition(&mut self, to: AutoMergeState, trigger: TransitionTrigger) {
        info!(from = %self.state, %to, %trigger, "auto-merge transition");
        self.history.push(Transition {
            from: self.state,
            to,
            trigger,
            at: Utc::now(),
        });
        self.state = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readiness::{BlockingCategory, BlockingReason};

    fn pr(state: PrState) -> PullRequestDetails {
        PullRequestDetails {
            number: 42,
            title: "Add widgets".to_string(),
            state,
            head_ref: "feat/widgets".to_string(),
            head_sha: "1111111aaaa".to_string(),
            base_ref: "main".to_string(),
            html_url: "https://github.com/octo/widgets/pull/42".to_string(),
        }
    }

    fn protection() -> BranchProtection {
        BranchProtection {
            required_checks: vec!["test".to_string()],
            required_approvals: 1,
        }
    }

    fn ready() -> ReadinessVerdict {
        ReadinessVerdict {
            ready: true,
            blocking_reasons: vec![],
        }
    }

    fn not_ready() -> ReadinessVerdict {
        ReadinessVerdict {
            ready: false,
            blocking_reasons: vec![BlockingReason {
                category: BlockingCategory::ChecksNotGreen,
                detail: "1 required check(s) not green: test (pending)".to_string(),
                checks: vec!["test".to_string()],
            }],
        }
    }

    fn enabled() -> AutoMerge {
        let pr = pr(PrState::Open);
        let protection = protection();
        let mut machine = AutoMerge::new();
        machine
            .enable(
                MergeMethod::Squash,
                &EnableContext {
                    pr: &pr,
                    protection: Some(&protection),
                },
            )
            .unwrap();
        machine
    }

    fn merged_result() -> MergeResult {
        MergeResult {
            merged: true,
            sha: Some("abcdef0123".to_string()),
            message: None,
        }
    }

    #[test]
    fn test_enable_records_transition() {
        let machine = enabled();
        assert_eq!(machine.state(), AutoMergeState::Enabled);
        assert_eq!(machine.method(), Some(MergeMethod::Squash));
        let t = machine.last_transition().unwrap();
        assert_eq!(t.from, AutoMergeState::Disabled);
        assert_eq!(t.to, AutoMergeState::Enabled);
        assert_eq!(
            t.trigger,
            TransitionTrigger::Enable {
                method: MergeMethod::Squash
            }
        );
    }

    #[test]
    fn test_enable_requires_protection() {
        let pr = pr(PrState::Open);
        let mut machine = AutoMerge::new();
        let err = machine
            .enable(
                MergeMethod::Merge,
                &EnableContext {
                    pr: &pr,
                    protection: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));
        assert_eq!(machine.state(), AutoMergeState::Disabled);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn test_enable_rejects_merged_or_closed_pr() {
        let protection = protection();
        for state in [PrState::Merged, PrState::Closed] {
            let pr = pr(state);
            let mut machine = AutoMerge::new();
            let err = machine
                .enable(
                    MergeMethod::Squash,
                    &EnableContext {
                        pr: &pr,
                        protection: Some(&protection),
                    },
                )
                .unwrap_err();
            assert!(matches!(err, Error::PreconditionFailed(_)), "{state}");
        }
    }

    #[test]
    fn test_implicit_cancellation_events() {
        let events = [
            AutoMergeEvent::BaseRetargeted {
                from: "main".to_string(),
                to: "release".to_string(),
            },
            AutoMergeEvent::HeadPushed {
                from: "1111111".to_string(),
                to: "2222222".to_string(),
            },
            AutoMergeEvent::Closed,
            AutoMergeEvent::ApprovalDismissed,
        ];
        for event in events {
            let mut machine = enabled();
            let t = machine.observe(event.clone()).unwrap();
            assert_eq!(t.to, AutoMergeState::Cancelled);
            assert_eq!(t.trigger, TransitionTrigger::Event { event });
            assert_eq!(machine.state(), AutoMergeState::Cancelled);
        }
    }

    #[test]
    fn test_events_ignored_when_not_enabled() {
        let mut machine = AutoMerge::new();
        assert!(machine.observe(AutoMergeEvent::Closed).is_none());
        assert_eq!(machine.state(), AutoMergeState::Disabled);
    }

    #[test]
    fn test_external_merge_is_terminal() {
        let mut machine = enabled();
        machine.observe(AutoMergeEvent::MergedExternally);
        assert_eq!(machine.state(), AutoMergeState::Merged);
        assert!(machine.observe(AutoMergeEvent::Closed).is_none());
    }

    #[test]
    fn test_cancelled_can_be_re_enabled() {
        let mut machine = enabled();
        machine.observe(AutoMergeEvent::ApprovalDismissed);
        let pr = pr(PrState::Open);
        let protection = protection();
        machine
            .enable(
                MergeMethod::Rebase,
                &EnableContext {
                    pr: &pr,
                    protection: Some(&protection),
                },
            )
            .unwrap();
        assert_eq!(machine.state(), AutoMergeState::Enabled);
        assert_eq!(machine.history().len(), 3);
    }

    #[test]
    fn test_disable_is_idempotent_and_terminal() {
        let mut machine = AutoMerge::new();
        machine.disable().unwrap();
        assert!(machine.history().is_empty());

        let mut machine = enabled();
        machine.disable().unwrap();
        assert_eq!(machine.state(), AutoMergeState::DisabledByUser);
        machine.disable().unwrap();
        assert_eq!(machine.history().len(), 2);

        let pr = pr(PrState::Open);
        let protection = protection();
        let err = machine
            .enable(
                MergeMethod::Squash,
                &EnableContext {
                    pr: &pr,
                    protection: Some(&protection),
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
    }

    #[test]
    fn test_ready_verdict_fires_merge_once() {
        let mut machine = enabled();
        assert!(machine.on_verdict(&not_ready()).is_none());

        let action = machine.on_verdict(&ready()).unwrap();
        assert_eq!(action.method, MergeMethod::Squash);
        assert!(machine.on_verdict(&ready()).is_none());

        machine.record_merge(&Ok(merged_result())).unwrap();
        assert_eq!(machine.state(), AutoMergeState::Merged);
        assert!(machine.on_verdict(&ready()).is_none());
    }

    #[test]
    fn test_failed_merge_stays_enabled_and_can_retry() {
        let mut machine = enabled();
        machine.on_verdict(&ready()).unwrap();
        machine
            .record_merge(&Err(Error::Transport("connection reset".to_string())))
            .unwrap();
        assert_eq!(machine.state(), AutoMergeState::Enabled);
        assert!(machine.on_verdict(&ready()).is_some());

        machine
            .record_merge(&Ok(MergeResult {
                merged: false,
                sha: None,
                message: Some("Base branch was modified".to_string()),
            }))
            .unwrap();
        assert_eq!(machine.state(), AutoMergeState::Enabled);
    }

    #[test]
    fn test_record_merge_without_action_is_rejected() {
        let mut machine = enabled();
        assert!(matches!(
            machine.record_merge(&Ok(merged_result())),
            Err(Error::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_disable_after_merge_is_rejected() {
        let mut machine = enabled();
        machine.on_verdict(&ready()).unwrap();
        machine.record_merge(&Ok(merged_result())).unwrap();
        assert!(matches!(machine.disable(), Err(Error::InvalidTransition(_))));
    }
}
