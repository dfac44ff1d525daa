//! Check snapshot fetcher
//!
//! Thin I/O layer over [`PlatformService`]: collects the check runs for a
//! PR's head commit and stamps which of them branch protection requires.
//! No decision logic lives here.

use crate::error::Result;
use crate::platform::PlatformService;
use crate::types::{BranchProtection, CheckRun, CheckSnapshot, PullRequestDetails};
use chrono::Utc;
use tracing::debug;

/// Fetch a fresh, immutable check snapshot for the PR's head commit.
pub async fn fetch_check_snapshot(
    platform: &dyn PlatformService,
    pr: &PullRequestDetails,
) -> Result<CheckSnapshot> {
    let runs = platform.list_check_runs(&pr.head_sha).await?;
    let protection = platform.get_branch_protection(&pr.base_ref).await?;

    let snapshot = CheckSnapshot {
        head_sha: pr.head_sha.clone(),
        runs: stamp_required(runs, protection.as_ref()),
        fetched_at: Utc::now(),
    };

    debug!(
        pr_number = pr.number,
        head_sha = %snapshot.head_sha,
        checks = snapshot.runs.len(),
        required = snapshot.runs.iter().filter(|r| r.is_required).count(),
        "fetched check snapshot"
    );
    Ok(snapshot)
}

/// Fetch PR details and a check snapshot for its current head.
pub async fn fetch_pr_checks(
    platform: &dyn PlatformService,
    pr_number: u64,
) -> Result<(PullRequestDetails, CheckSnapshot)> {
    let details = platform.get_pr_details(pr_number).await?;
    let snapshot = fetch_check_snapshot(platform, &details).await?;
    Ok((details, snapshot))
}

/// Mark runs named (plainly or qualified) by branch protection as required.
fn stamp_required(runs: Vec<CheckRun>, protection: Option<&BranchProtection>) -> Vec<CheckRun> {
    let Some(protection) = protection else {
        return runs;
    };

    runs.into_iter()
        .map(|mut run| {
            run.is_required = run.is_required
                || protection
                    .required_checks
                    .iter()
                    .any(|name| run.matches_name(name));
            run
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CheckConclusion, CheckStatus};

    fn run(name: &str, suite: Option<&str>) -> CheckRun {
        CheckRun {
            id: 0,
            name: name.to_string(),
            suite: suite.map(ToString::to_string),
            status: CheckStatus::Completed,
            conclusion: Some(CheckConclusion::Success),
            started_at: None,
            completed_at: None,
            is_required: false,
            details_url: None,
            output: None,
        }
    }

    #[test]
    fn test_unprotected_branch_marks_nothing() {
        let runs = stamp_required(vec![run("build", None)], None);
        assert!(!runs[0].is_required);
    }

    #[test]
    fn test_stamps_plain_and_qualified_names() {
        let protection = BranchProtection {
            required_checks: vec!["build".to_string(), "github-actions/lint".to_string()],
            required_approvals: 1,
        };
        let runs = stamp_required(
            vec![
                run("build", Some("github-actions")),
                run("lint", Some("github-actions")),
                run("docs", None),
            ],
            Some(&protection),
        );
        assert!(runs[0].is_required);
        assert!(runs[1].is_required);
        assert!(!runs[2].is_required);
    }

    #[test]
    fn test_keeps_platform_required_flag() {
        let mut gated = run("rspec", None);
        gated.is_required = true;
        let runs = stamp_required(vec![gated], Some(&BranchProtection::default()));
        assert!(runs[0].is_required);
    }
}
