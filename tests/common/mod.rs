//! Shared fixtures for integration and unit tests

#![allow(dead_code)]

mod mock_platform;

pub use mock_platform::{MockCall, MockError, MockPlatformService, Reply};

use chrono::Utc;
use merge_gate::types::{
    BranchProtection, CheckConclusion, CheckRun, CheckSnapshot, CheckStatus, MergeResult,
    MergeState, MergeStateStatus, Platform, PlatformConfig, PrState, PullRequestDetails,
    ReviewDecision,
};

pub const HEAD_SHA: &str = "1111111111111111111111111111111111111111";
pub const NEW_HEAD_SHA: &str = "2222222222222222222222222222222222222222";

pub fn github_config() -> PlatformConfig {
    PlatformConfig {
        platform: Platform::GitHub,
        owner: "octo".to_string(),
        repo: "widgets".to_string(),
        host: None,
    }
}

pub fn make_pr(number: u64, head_sha: &str) -> PullRequestDetails {
    PullRequestDetails {
        number,
        title: format!("Change #{number}"),
        state: PrState::Open,
        head_ref: format!("feature-{number}"),
        head_sha: head_sha.to_string(),
        base_ref: "main".to_string(),
        html_url: format!("https://github.com/octo/widgets/pull/{number}"),
    }
}

pub fn make_check(name: &str, status: CheckStatus, conclusion: Option<CheckConclusion>) -> CheckRun {
    CheckRun {
        id: 0,
        name: name.to_string(),
        suite: Some("github-actions".to_string()),
        status,
        conclusion,
        started_at: None,
        completed_at: None,
        is_required: false,
        details_url: None,
        output: None,
    }
}

pub fn passing(name: &str) -> CheckRun {
    make_check(name, CheckStatus::Completed, Some(CheckConclusion::Success))
}

pub fn failing(name: &str) -> CheckRun {
    make_check(name, CheckStatus::Completed, Some(CheckConclusion::Failure))
}

pub fn running(name: &str) -> CheckRun {
    make_check(name, CheckStatus::InProgress, None)
}

pub fn completed(name: &str, conclusion: CheckConclusion) -> CheckRun {
    make_check(name, CheckStatus::Completed, Some(conclusion))
}

pub fn required(mut run: CheckRun) -> CheckRun {
    run.is_required = true;
    run
}

pub fn snapshot(runs: Vec<CheckRun>) -> CheckSnapshot {
    CheckSnapshot {
        head_sha: HEAD_SHA.to_string(),
        runs,
        fetched_at: Utc::now(),
    }
}

pub fn protection(required_checks: &[&str]) -> BranchProtection {
    BranchProtection {
        required_checks: required_checks.iter().map(ToString::to_string).collect(),
        required_approvals: 1,
    }
}

/// Mergeable, approved, no threads, not a draft
pub fn clean_state() -> MergeState {
    MergeState {
        status: MergeStateStatus::Mergeable,
        review_decision: ReviewDecision::Approved,
        unresolved_thread_count: 0,
        is_draft: false,
        auto_merge: None,
    }
}

pub fn state_with(status: MergeStateStatus, review_decision: ReviewDecision) -> MergeState {
    MergeState {
        status,
        review_decision,
        ..clean_state()
    }
}

pub fn merged(sha: &str) -> MergeResult {
    MergeResult {
        merged: true,
        sha: Some(sha.to_string()),
        message: None,
    }
}

/// Mock for PR #42 on a protected `main` requiring `test`, with all checks
/// green and a clean merge state.
pub fn ready_platform() -> MockPlatformService {
    let mock = MockPlatformService::with_config(github_config());
    mock.set_pr_details(make_pr(42, HEAD_SHA));
    mock.set_protection(Some(protection(&["test"])));
    mock.set_check_runs(vec![passing("test"), passing("lint")]);
    mock.set_merge_state(clean_state());
    mock.set_merge_result(merged("abcdef1234567"));
    mock
}
