//! Platform services for GitHub and GitLab
//!
//! Provides a unified fetch interface over the hosting platform. The engine
//! never talks HTTP directly; everything goes through [`PlatformService`],
//! which is also the seam tests replace with a fake.

mod detection;
mod factory;
mod github;
mod gitlab;

pub use detection::{detect_platform, parse_repo_info};
pub use factory::create_platform_service;
pub use github::GitHubService;
pub use gitlab::GitLabService;

use crate::error::Result;
use crate::types::{
    BranchProtection, CheckRun, MergeMethod, MergeResult, MergeState, PlatformConfig,
    PullRequestDetails,
};
use async_trait::async_trait;

/// Platform service trait for check and merge-state retrieval
///
/// Implementations must surface `NotFound`, `RateLimited`, `Unauthenticated`
/// and `Transport` errors distinctly so the poller can pick a retry policy.
#[async_trait]
pub trait PlatformService: Send + Sync {
    /// Get PR details (state, head commit, base branch)
    async fn get_pr_details(&self, pr_number: u64) -> Result<PullRequestDetails>;

    /// List check runs reported for a commit.
    ///
    /// The fetcher stamps `is_required` from branch protection; platforms
    /// that gate on whole pipelines (GitLab) may already set it per run.
    async fn list_check_runs(&self, commit_ref: &str) -> Result<Vec<CheckRun>>;

    /// Get protection rules for a branch, `None` if the branch is unprotected
    async fn get_branch_protection(&self, branch: &str) -> Result<Option<BranchProtection>>;

    /// Get the current merge state of a PR
    async fn get_merge_state(&self, pr_number: u64) -> Result<MergeState>;

    /// Fetch the raw log of a check run
    async fn get_check_log(&self, check: &CheckRun) -> Result<String>;

    /// Merge a PR with the specified method
    async fn merge_pr(&self, pr_number: u64, method: MergeMethod) -> Result<MergeResult>;

    /// Get the platform configuration
    fn config(&self) -> &PlatformConfig;
}
