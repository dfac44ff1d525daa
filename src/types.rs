//! Core types for merge-gate

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Check runs
// =============================================================================

/// Lifecycle status of a check run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Waiting for a runner
    Queued,
    /// Currently executing
    InProgress,
    /// Finished; a conclusion is available
    Completed,
}

impl CheckStatus {
    /// Parse a raw platform status string.
    ///
    /// GitHub reports a few extra pre-start states (`waiting`, `requested`,
    /// `pending`) which all fold into `Queued`.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "queued" | "waiting" | "requested" | "pending" => Ok(Self::Queued),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            _ => Err(Error::UnrecognizedConclusion {
                status: raw.to_string(),
                conclusion: "none".to_string(),
            }),
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Final result of a completed check run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckConclusion {
    /// Passed
    Success,
    /// Failed
    Failure,
    /// Reported as pending by a legacy status context
    Pending,
    /// Not run because of workflow conditions
    Skipped,
    /// Cancelled before finishing
    Cancelled,
    /// Exceeded its time limit
    TimedOut,
    /// Needs a human to act before it can finish
    ActionRequired,
    /// Finished without a pass/fail opinion
    Neutral,
    /// Outdated; may be superseded by a re-run
    Stale,
}

impl CheckConclusion {
    /// Every conclusion in the taxonomy.
    pub const ALL: [Self; 9] = [
        Self::Success,
        Self::Failure,
        Self::Pending,
        Self::Skipped,
        Self::Cancelled,
        Self::TimedOut,
        Self::ActionRequired,
        Self::Neutral,
        Self::Stale,
    ];

    /// Parse a raw platform conclusion string.
    pub fn parse(status: CheckStatus, raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "pending" => Ok(Self::Pending),
            "skipped" => Ok(Self::Skipped),
            "cancelled" => Ok(Self::Cancelled),
            "timed_out" => Ok(Self::TimedOut),
            "action_required" => Ok(Self::ActionRequired),
            "neutral" => Ok(Self::Neutral),
            "stale" => Ok(Self::Stale),
            _ => Err(Error::UnrecognizedConclusion {
                status: status.to_string(),
                conclusion: raw.to_string(),
            }),
        }
    }
}

impl fmt::Display for CheckConclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Pending => "pending",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
            Self::ActionRequired => "action_required",
            Self::Neutral => "neutral",
            Self::Stale => "stale",
        };
        f.write_str(s)
    }
}

/// Summary output attached to a check run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutput {
    /// Output title
    pub title: Option<String>,
    /// Output summary (markdown)
    pub summary: Option<String>,
    /// Number of annotations attached to the run
    pub annotations_count: u64,
}

/// One CI job/check for a specific commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRun {
    /// Platform ID (check run ID on GitHub, job/status ID on GitLab)
    pub id: u64,
    /// Check name, unique within a suite but not across suites
    pub name: String,
    /// Producing suite/app/workflow, used to disambiguate duplicate names
    pub suite: Option<String>,
    /// Lifecycle status
    pub status: CheckStatus,
    /// Set if and only if `status == Completed`
    pub conclusion: Option<CheckConclusion>,
    /// When the run started
    pub started_at: Option<DateTime<Utc>>,
    /// When the run finished
    pub completed_at: Option<DateTime<Utc>>,
    /// Whether branch protection requires this check
    pub is_required: bool,
    /// Link to the run on the platform
    pub details_url: Option<String>,
    /// Optional run output
    pub output: Option<CheckOutput>,
}

impl CheckRun {
    /// Wall-clock duration; `None` unless both timestamps are known.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// `suite/name` when a suite is known, otherwise just the name.
    pub fn qualified_name(&self) -> String {
        self.suite
            .as_ref()
            .map_or_else(|| self.name.clone(), |suite| format!("{suite}/{}", self.name))
    }

    /// Whether this run matches a user-supplied name (plain or qualified).
    pub fn matches_name(&self, name: &str) -> bool {
        self.name == name || self.qualified_name() == name
    }
}

/// Immutable set of check runs fetched for one commit in one poll tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSnapshot {
    /// Commit the checks belong to
    pub head_sha: String,
    /// Check runs in platform order
    pub runs: Vec<CheckRun>,
    /// When this snapshot was taken
    pub fetched_at: DateTime<Utc>,
}

impl CheckSnapshot {
    /// Name to show for a run: qualified only when the plain name is ambiguous.
    pub fn display_name(&self, run: &CheckRun) -> String {
        let ambiguous = self
            .runs
            .iter()
            .any(|other| other.name == run.name && other.suite != run.suite);
        if ambiguous {
            run.qualified_name()
        } else {
            run.name.clone()
        }
    }
}

// =============================================================================
// Merge state
// =============================================================================

/// Platform-computed mergeability classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStateStatus {
    /// Clean and mergeable
    Mergeable,
    /// Has merge conflicts
    Conflicting,
    /// Platform is still computing; always transient
    Unknown,
    /// Blocked by branch protection
    Blocked,
    /// Head branch is behind the base branch
    Behind,
    /// Merge commit cannot be cleanly created
    Dirty,
    /// Mergeable, but non-required checks are failing
    Unstable,
}

impl fmt::Display for MergeStateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mergeable => "mergeable",
            Self::Conflicting => "conflicting",
            Self::Unknown => "unknown",
            Self::Blocked => "blocked",
            Self::Behind => "behind",
            Self::Dirty => "dirty",
            Self::Unstable => "unstable",
        };
        f.write_str(s)
    }
}

/// Aggregate review decision on a PR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Approved by required reviewers
    Approved,
    /// A reviewer requested changes
    ChangesRequested,
    /// Review required but not yet given
    ReviewRequired,
    /// No review policy applies
    None,
}

impl fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Approved => "approved",
            Self::ChangesRequested => "changes_requested",
            Self::ReviewRequired => "review_required",
            Self::None => "none",
        };
        f.write_str(s)
    }
}

/// Platform-side auto-merge request, present only while enabled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMergeRequest {
    /// When auto-merge was enabled
    pub enabled_at: Option<DateTime<Utc>>,
    /// Merge method that will be used
    pub method: MergeMethod,
    /// Login of the user who enabled it
    pub enabled_by: Option<String>,
}

/// Per-PR merge metadata, fetched fresh on every tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeState {
    /// Mergeability classification
    pub status: MergeStateStatus,
    /// Aggregate review decision
    pub review_decision: ReviewDecision,
    /// Number of unresolved review threads
    pub unresolved_thread_count: u32,
    /// Whether the PR is a draft
    pub is_draft: bool,
    /// Platform auto-merge request; `None` means disabled
    pub auto_merge: Option<AutoMergeRequest>,
}

// =============================================================================
// Pull requests
// =============================================================================

/// PR state (open, closed, merged)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    /// PR is open and can be merged
    Open,
    /// PR was closed without merging
    Closed,
    /// PR was merged
    Merged,
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

/// PR details needed to locate checks and protections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestDetails {
    /// PR/MR number
    pub number: u64,
    /// PR/MR title
    pub title: String,
    /// Current state of the PR
    pub state: PrState,
    /// Head branch name
    pub head_ref: String,
    /// Commit SHA at the head of the PR
    pub head_sha: String,
    /// Base branch name
    pub base_ref: String,
    /// Web URL for the PR/MR
    pub html_url: String,
}

/// Branch protection rules relevant to merging
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchProtection {
    /// Names of checks that must pass
    pub required_checks: Vec<String>,
    /// Number of approving reviews required
    pub required_approvals: u32,
}

/// Result of a merge operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    /// Whether the merge was successful
    pub merged: bool,
    /// The SHA of the merge commit (if successful)
    pub sha: Option<String>,
    /// Message from the merge operation (especially on failure)
    pub message: Option<String>,
}

/// Merge strategy/method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MergeMethod {
    /// Squash all commits into one
    Squash,
    /// Create a merge commit
    Merge,
    /// Rebase commits onto base branch
    Rebase,
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Squash => write!(f, "squash"),
            Self::Merge => write!(f, "merge"),
            Self::Rebase => write!(f, "rebase"),
        }
    }
}

// =============================================================================
// Platform identity
// =============================================================================

/// Detected platform type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    /// GitHub or GitHub Enterprise
    GitHub,
    /// GitLab or self-hosted GitLab
    GitLab,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GitHub => write!(f, "GitHub"),
            Self::GitLab => write!(f, "GitLab"),
        }
    }
}

/// Platform configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Platform type
    pub platform: Platform,
    /// Repository owner (user, organization or group path)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Custom host (None for github.com/gitlab.com)
    pub host: Option<String>,
}

/// A user-supplied reference to a pull request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrRef {
    /// `owner/repo` when the reference named one
    pub repo: Option<(String, String)>,
    /// PR/MR number
    pub number: u64,
}

impl PrRef {
    /// Parse `123`, `#123`, `owner/repo#123` or a PR/MR web URL.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = || Error::InvalidInput(format!("not a pull request reference: '{input}'"));

        if input.starts_with("http://") || input.starts_with("https://") {
            let url = url::Url::parse(input).map_err(|_| invalid())?;
            let segments: Vec<&str> = url
                .path_segments()
                .map(|s| s.filter(|p| !p.is_empty()).collect())
                .unwrap_or_default();
            // github: owner/repo/pull/N, gitlab: group/.../repo/-/merge_requests/N
            let pos = segments
                .iter()
                .rposition(|s| *s == "pull" || *s == "merge_requests")
                .ok_or_else(invalid)?;
            let number = segments
                .get(pos + 1)
                .and_then(|n| n.parse().ok())
                .ok_or_else(invalid)?;
            let mut repo_parts: Vec<&str> = segments[..pos].to_vec();
            if repo_parts.last() == Some(&"-") {
                repo_parts.pop();
            }
            if repo_parts.len() < 2 {
                return Err(invalid());
            }
            let repo = repo_parts.pop().ok_or_else(invalid)?.to_string();
            let owner = repo_parts.join("/");
            return Ok(Self {
                repo: Some((owner, repo)),
                number: Self::nonzero(number).ok_or_else(invalid)?,
            });
        }

        if let Some((repo_part, number)) = input.split_once('#')
            && !repo_part.is_empty()
        {
            let (owner, repo) = repo_part.rsplit_once('/').ok_or_else(invalid)?;
            if owner.is_empty() || repo.is_empty() {
                return Err(invalid());
            }
            let number = number.parse().ok().and_then(Self::nonzero).ok_or_else(invalid)?;
            return Ok(Self {
                repo: Some((owner.to_string(), repo.to_string())),
                number,
            });
        }

        let number = input
            .trim_start_matches('#')
            .parse()
            .ok()
            .and_then(Self::nonzero)
            .ok_or_else(invalid)?;
        Ok(Self { repo: None, number })
    }

    const fn nonzero(n: u64) -> Option<u64> {
        if n == 0 { None } else { Some(n) }
    }
}
