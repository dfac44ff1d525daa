//! Merge readiness evaluation - pure functions
//!
//! Combines a check snapshot with the PR's merge state into a verdict with
//! itemized blocking reasons. No I/O happens here; every condition is checked
//! so the report is always complete, never short-circuited.

use crate::classify::{CheckKind, StalePolicy, classify_snapshot};
use crate::error::Result;
use crate::types::{CheckSnapshot, MergeState, MergeStateStatus, ReviewDecision};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a PR cannot be merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockingCategory {
    /// Merge conflicts with the base branch
    Conflicts,
    /// Branch protection rules are not satisfied
    BranchProtectionBlocked,
    /// Head branch must be updated from base
    BehindBase,
    /// Platform is still computing mergeability; retry
    MergeStateComputing,
    /// PR is still a draft
    Draft,
    /// Required checks are failing, blocked or unfinished
    ChecksNotGreen,
    /// Review threads remain unresolved
    UnresolvedThreads,
    /// Required review approval is missing
    ReviewRequired,
}

impl BlockingCategory {
    /// Categories derived from the merge state alone.
    pub const fn is_merge_state(self) -> bool {
        matches!(
            self,
            Self::Conflicts
                | Self::BranchProtectionBlocked
                | Self::BehindBase
                | Self::MergeStateComputing
                | Self::Draft
        )
    }
}

impl fmt::Display for BlockingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Conflicts => "conflicts",
            Self::BranchProtectionBlocked => "branch protection",
            Self::BehindBase => "behind base",
            Self::MergeStateComputing => "merge state computing",
            Self::Draft => "draft",
            Self::ChecksNotGreen => "checks not green",
            Self::UnresolvedThreads => "unresolved threads",
            Self::ReviewRequired => "review required",
        };
        f.write_str(s)
    }
}

/// One itemized blocking reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingReason {
    /// Reason category
    pub category: BlockingCategory,
    /// Human-readable explanation
    pub detail: String,
    /// Offending check names (only for `ChecksNotGreen`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<String>,
}

impl BlockingReason {
    fn new(category: BlockingCategory, detail: impl Into<String>) -> Self {
        Self {
            category,
            detail: detail.into(),
            checks: Vec::new(),
        }
    }
}

impl fmt::Display for BlockingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.detail)
    }
}

/// Readiness verdict, recomputed on every evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessVerdict {
    /// Whether the PR can be merged now
    pub ready: bool,
    /// Ordered reasons; empty iff `ready`
    pub blocking_reasons: Vec<BlockingReason>,
}

impl ReadinessVerdict {
    fn from_reasons(blocking_reasons: Vec<BlockingReason>) -> Self {
        Self {
            ready: blocking_reasons.is_empty(),
            blocking_reasons,
        }
    }

    /// Categories in report order.
    pub fn categories(&self) -> Vec<BlockingCategory> {
        self.blocking_reasons.iter().map(|r| r.category).collect()
    }

    /// Whether a given category is among the reasons.
    pub fn has(&self, category: BlockingCategory) -> bool {
        self.blocking_reasons.iter().any(|r| r.category == category)
    }

    /// Only blocked because the platform is still computing mergeability.
    ///
    /// Callers should re-fetch rather than treat this as final.
    pub fn is_retryable(&self) -> bool {
        !self.ready
            && self
                .blocking_reasons
                .iter()
                .all(|r| r.category == BlockingCategory::MergeStateComputing)
    }
}

/// Relaxations for evaluation; the default is fully strict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct EvaluateOptions {
    /// Skip the required-checks condition
    pub ignore_ci: bool,
    /// Skip the unresolved-threads condition
    pub ignore_threads: bool,
    /// Skip the review-decision condition
    pub ignore_reviews: bool,
    /// Treat cancelled checks as passing
    pub ignore_cancelled: bool,
    /// How unsuperseded stale checks count
    pub stale_policy: StalePolicy,
}

/// Evaluate merge readiness (PURE - no I/O, easily testable)
///
/// Fails only when the snapshot holds a check the classifier cannot map,
/// which never degrades to "passing".
pub fn evaluate(
    snapshot: &CheckSnapshot,
    merge_state: &MergeState,
    options: &EvaluateOptions,
) -> Result<ReadinessVerdict> {
    let mut reasons = Vec::new();

    match merge_state.status {
        MergeStateStatus::Conflicting | MergeStateStatus::Dirty => {
            reasons.push(BlockingReason::new(
                BlockingCategory::Conflicts,
                "Has merge conflicts with the base branch",
            ));
        }
        MergeStateStatus::Blocked => reasons.push(BlockingReason::new(
            BlockingCategory::BranchProtectionBlocked,
            "Blocked by branch protection rules",
        )),
        MergeStateStatus::Behind => reasons.push(BlockingReason::new(
            BlockingCategory::BehindBase,
            "Head branch is behind the base branch",
        )),
        MergeStateStatus::Unknown => reasons.push(BlockingReason::new(
            BlockingCategory::MergeStateComputing,
            "Merge status unknown (still computing)",
        )),
        MergeStateStatus::Mergeable | MergeStateStatus::Unstable => {}
    }

    if merge_state.is_draft {
        reasons.push(BlockingReason::new(BlockingCategory::Draft, "PR is a draft"));
    }

    if !options.ignore_ci
        && let Some(reason) = checks_reason(snapshot, options)?
    {
        reasons.push(reason);
    }

    if !options.ignore_threads && merge_state.unresolved_thread_count > 0 {
        reasons.push(BlockingReason::new(
            BlockingCategory::UnresolvedThreads,
            format!(
                "{} unresolved review thread(s)",
                merge_state.unresolved_thread_count
            ),
        ));
    }

    // ReviewDecision::None means no review policy applies
    if !options.ignore_reviews {
        match merge_state.review_decision {
            ReviewDecision::ChangesRequested => reasons.push(BlockingReason::new(
                BlockingCategory::ReviewRequired,
                "Changes requested by a reviewer",
            )),
            ReviewDecision::ReviewRequired => reasons.push(BlockingReason::new(
                BlockingCategory::ReviewRequired,
                "Not approved",
            )),
            ReviewDecision::Approved | ReviewDecision::None => {}
        }
    }

    Ok(ReadinessVerdict::from_reasons(reasons))
}

fn checks_reason(
    snapshot: &CheckSnapshot,
    options: &EvaluateOptions,
) -> Result<Option<BlockingReason>> {
    let classified = classify_snapshot(&snapshot.runs)?;

    let mut offenders = Vec::new();
    for check in classified
        .iter()
        .filter(|c| c.run.is_required && !c.superseded)
    {
        let blocking = match check.kind {
            CheckKind::Passing => false,
            CheckKind::Cancelled => !options.ignore_cancelled,
            CheckKind::Stale => options.stale_policy == StalePolicy::Block,
            CheckKind::Failing | CheckKind::Blocked | CheckKind::Pending => true,
        };
        if blocking {
            offenders.push((snapshot.display_name(check.run), check.kind));
        }
    }

    if offenders.is_empty() {
        return Ok(None);
    }

    let summary: Vec<String> = offenders
        .iter()
        .map(|(name, kind)| format!("{name} ({kind})"))
        .collect();
    Ok(Some(BlockingReason {
        category: BlockingCategory::ChecksNotGreen,
        detail: format!(
            "{} required check(s) not green: {}",
            offenders.len(),
            summary.join(", ")
        ),
        checks: offenders.into_iter().map(|(name, _)| name).collect(),
    }))
}
