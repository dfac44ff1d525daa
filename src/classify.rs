//! Conclusion classifier
//!
//! Maps raw `(status, conclusion)` pairs onto a small fixed taxonomy and a
//! terminal flag. Pure functions only; the poller and the readiness
//! evaluator both build on these.

use crate::error::{Error, Result};
use crate::types::{CheckConclusion, CheckRun, CheckStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified outcome of a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Not finished yet
    Pending,
    /// Finished and does not block
    Passing,
    /// Finished and failed
    Failing,
    /// Cancelled before finishing
    Cancelled,
    /// Waiting on a human; never resolves by itself
    Blocked,
    /// Outdated result with no newer run
    Stale,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Passing => "passing",
            Self::Failing => "failing",
            Self::Cancelled => "cancelled",
            Self::Blocked => "blocked",
            Self::Stale => "stale",
        };
        f.write_str(s)
    }
}

/// Result of classifying a single `(status, conclusion)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Classified kind
    pub kind: CheckKind,
    /// Whether the check will not change without a re-run
    pub terminal: bool,
}

impl Classification {
    const fn new(kind: CheckKind, terminal: bool) -> Self {
        Self { kind, terminal }
    }
}

/// How an unsuperseded `stale` check is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Stale checks block merging and keep the poller waiting for a re-run
    #[default]
    Block,
    /// Stale checks are treated like passing ones
    Ignore,
}

/// Classify a status/conclusion pair.
///
/// A conclusion on a run that has not completed, or a completed run without
/// one, violates the check-run invariant and is rejected.
pub fn classify(status: CheckStatus, conclusion: Option<CheckConclusion>) -> Result<Classification> {
    use CheckConclusion as C;

    match (status, conclusion) {
        (CheckStatus::Queued | CheckStatus::InProgress, None)
        | (CheckStatus::Completed, Some(C::Pending)) => {
            Ok(Classification::new(CheckKind::Pending, false))
        }
        (CheckStatus::Completed, Some(C::Success | C::Skipped | C::Neutral)) => {
            Ok(Classification::new(CheckKind::Passing, true))
        }
        (CheckStatus::Completed, Some(C::Failure | C::TimedOut)) => {
            Ok(Classification::new(CheckKind::Failing, true))
        }
        (CheckStatus::Completed, Some(C::Cancelled)) => {
            Ok(Classification::new(CheckKind::Cancelled, true))
        }
        (CheckStatus::Completed, Some(C::ActionRequired)) => {
            Ok(Classification::new(CheckKind::Blocked, true))
        }
        (CheckStatus::Completed, Some(C::Stale)) => Ok(Classification::new(CheckKind::Stale, true)),
        (status, conclusion) => Err(Error::UnrecognizedConclusion {
            status: status.to_string(),
            conclusion: conclusion.map_or_else(|| "none".to_string(), |c| c.to_string()),
        }),
    }
}

/// A check run together with its classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedCheck<'a> {
    /// The underlying run
    pub run: &'a CheckRun,
    /// Kind after the supersede pass
    pub kind: CheckKind,
    /// Whether the run is terminal after the supersede pass
    pub terminal: bool,
    /// A newer run with the same identity exists in the snapshot
    pub superseded: bool,
}

impl ClassifiedCheck<'_> {
    /// Whether this check keeps the poller waiting.
    pub fn is_settled(&self, stale_policy: StalePolicy) -> bool {
        if self.superseded {
            return true;
        }
        match self.kind {
            CheckKind::Stale => stale_policy == StalePolicy::Ignore,
            _ => self.terminal,
        }
    }
}

/// Classify every run of a snapshot, applying the supersede rule.
///
/// A `stale` run is superseded when a newer run with the same suite and name
/// exists. Newer means a later `started_at` when both runs have one, otherwise
/// a later position in the snapshot. Superseded runs are reported as pending
/// and flagged so callers skip them.
pub fn classify_snapshot(runs: &[CheckRun]) -> Result<Vec<ClassifiedCheck<'_>>> {
    let mut classified = Vec::with_capacity(runs.len());

    for (idx, run) in runs.iter().enumerate() {
        let Classification { kind, terminal } = classify(run.status, run.conclusion)?;

        let superseded = kind == CheckKind::Stale
            && runs.iter().enumerate().any(|(other_idx, other)| {
                other_idx != idx
                    && other.name == run.name
                    && other.suite == run.suite
                    && is_newer(other, other_idx, run, idx)
            });

        if superseded {
            classified.push(ClassifiedCheck {
                run,
                kind: CheckKind::Pending,
                terminal: false,
                superseded: true,
            });
        } else {
            classified.push(ClassifiedCheck {
                run,
                kind,
                terminal,
                superseded: false,
            });
        }
    }

    Ok(classified)
}

fn is_newer(candidate: &CheckRun, candidate_idx: usize, base: &CheckRun, base_idx: usize) -> bool {
    match (candidate.started_at, base.started_at) {
        (Some(c), Some(b)) if c != b => c > b,
        _ => candidate_idx > base_idx,
    }
}
