//! GitLab platform service implementation

use crate::error::{Error, Result};
use crate::platform::PlatformService;
use crate::types::{
    AutoMergeRequest, BranchProtection, CheckConclusion, CheckOutput, CheckRun, CheckStatus,
    MergeMethod, MergeResult, MergeState, MergeStateStatus, Platform, PlatformConfig, PrState,
    PullRequestDetails, ReviewDecision,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Upper bound on pages fetched from a paginated endpoint
const MAX_PAGES: u32 = 50;

/// GitLab service using reqwest
pub struct GitLabService {
    client: Client,
    token: String,
    api_base: String,
    config: PlatformConfig,
    project_path: String,
}

#[derive(Deserialize)]
struct MergeRequestDetails {
    iid: u64,
    title: String,
    description: Option<String>,
    state: String, // "opened", "closed", "merged", "locked"
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    has_conflicts: bool,
    detailed_merge_status: Option<String>,
    #[serde(default)]
    merge_when_pipeline_succeeds: bool,
    merge_user: Option<GitLabUser>,
    #[serde(default)]
    squash: bool,
    web_url: String,
    source_branch: String,
    target_branch: String,
    sha: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct GitLabUser {
    username: String,
}

#[derive(Deserialize)]
struct CommitStatus {
    id: u64,
    name: String,
    status: String,
    #[serde(default)]
    allow_failure: bool,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    target_url: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct ProjectSettings {
    #[serde(default)]
    only_allow_merge_if_pipeline_succeeds: bool,
}

#[derive(Deserialize)]
struct ProtectedBranch {
    name: String,
}

#[derive(Deserialize)]
struct ProjectApprovals {
    #[serde(default)]
    approvals_before_merge: u32,
}

/// MR approvals response
#[derive(Deserialize)]
struct MrApprovals {
    #[serde(default)]
    approved: bool,
    #[serde(default)]
    approvals_required: u32,
    #[serde(default)]
    approvals_left: u32,
}

#[derive(Deserialize)]
struct Discussion {
    notes: Vec<DiscussionNote>,
}

#[derive(Deserialize)]
struct DiscussionNote {
    #[serde(default)]
    resolvable: bool,
    #[serde(default)]
    resolved: bool,
}

/// Merge response
#[derive(Deserialize)]
struct MergeResponse {
    state: String,
    merge_commit_sha: Option<String>,
    squash_commit_sha: Option<String>,
}

impl GitLabService {
    /// Create a new GitLab service
    pub fn new(token: String, owner: String, repo: String, host: Option<String>) -> Result<Self> {
        let api_base = format!(
            "https://{}/api/v4",
            host.as_deref().unwrap_or("gitlab.com")
        );
        Self::build(token, owner, repo, host, api_base)
    }

    /// Create a service against an explicit API base URL (proxies, test servers).
    pub fn with_api_base(token: String, owner: String, repo: String, api_base: &str) -> Result<Self> {
        let api_base = api_base.trim_end_matches('/').to_string();
        Self::build(token, owner, repo, None, api_base)
    }

    fn build(
        token: String,
        owner: String,
        repo: String,
        host: Option<String>,
        api_base: String,
    ) -> Result<Self> {
        let project_path = format!("{owner}/{repo}");

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::GitLabApi(format!("failed to create HTTP client: {e}")))?;

        let config_host = host.filter(|h| h != "gitlab.com");

        Ok(Self {
            client,
            token,
            api_base,
            config: PlatformConfig {
                platform: Platform::GitLab,
                owner,
                repo,
                host: config_host,
            },
            project_path,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn project_url(&self, path: &str) -> String {
        self.api_url(&format!(
            "/projects/{}{}",
            urlencoding::encode(&self.project_path),
            path
        ))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request.header("PRIVATE-TOKEN", &self.token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        debug!(%status, what, "GitLab request failed");

        Err(
            match Error::from_status(status.as_u16(), retry_after, format!("{what}: {}", body.trim())) {
                Error::Internal(msg) => Error::GitLabApi(msg),
                other => other,
            },
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        self.send(self.client.get(url), what)
            .await?
            .json()
            .await
            .map_err(|e| Error::GitLabApi(format!("failed to parse {what}: {e}")))
    }

    /// Follow `x-next-page` until exhausted
    async fn get_all<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1;

        while page <= MAX_PAGES {
            let page_param = page.to_string();
            let request = self
                .client
                .get(url)
                .query(&[("per_page", "100"), ("page", page_param.as_str())]);
            let response = self.send(request, what).await?;
            let next = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u32>().ok());
            let batch: Vec<T> = response
                .json()
                .await
                .map_err(|e| Error::GitLabApi(format!("failed to parse {what}: {e}")))?;
            items.extend(batch);

            match next {
                Some(n) if n > page => page = n,
                _ => break,
            }
        }

        Ok(items)
    }

    async fn get_mr(&self, pr_number: u64) -> Result<MergeRequestDetails> {
        self.get_json(
            &self.project_url(&format!("/merge_requests/{pr_number}")),
            "merge request",
        )
        .await
    }

    async fn pipeline_must_succeed(&self) -> Result<bool> {
        let settings: ProjectSettings = self.get_json(&self.project_url(""), "project").await?;
        Ok(settings.only_allow_merge_if_pipeline_succeeds)
    }
}

fn check_run_from_status(raw: CommitStatus, pipeline_required: bool) -> Result<CheckRun> {
    use CheckConclusion as C;

    let (status, conclusion) = match raw.status.as_str() {
        "created" | "pending" | "waiting_for_resource" | "preparing" | "scheduled" => {
            (CheckStatus::Queued, None)
        }
        // canceling is transitional; the job settles on canceled
        "running" | "canceling" => (CheckStatus::InProgress, None),
        "success" => (CheckStatus::Completed, Some(C::Success)),
        // allowed-to-fail jobs never gate the pipeline
        "failed" if raw.allow_failure => (CheckStatus::Completed, Some(C::Neutral)),
        "failed" => (CheckStatus::Completed, Some(C::Failure)),
        "canceled" => (CheckStatus::Completed, Some(C::Cancelled)),
        "skipped" => (CheckStatus::Completed, Some(C::Skipped)),
        "manual" => (CheckStatus::Completed, Some(C::ActionRequired)),
        other => {
            return Err(Error::UnrecognizedConclusion {
                status: other.to_string(),
                conclusion: "none".to_string(),
            });
        }
    };

    Ok(CheckRun {
        id: raw.id,
        name: raw.name,
        suite: None,
        status,
        conclusion,
        started_at: raw.started_at,
        completed_at: raw.finished_at,
        is_required: pipeline_required && !raw.allow_failure,
        details_url: raw.target_url,
        output: raw.description.map(|d| CheckOutput {
            title: None,
            summary: Some(d),
            annotations_count: 0,
        }),
    })
}

fn merge_state_status(mr: &MergeRequestDetails) -> MergeStateStatus {
    if mr.has_conflicts {
        return MergeStateStatus::Conflicting;
    }
    match mr.detailed_merge_status.as_deref() {
        Some("mergeable") => MergeStateStatus::Mergeable,
        Some("conflict") => MergeStateStatus::Conflicting,
        Some("need_rebase") => MergeStateStatus::Behind,
        Some("checking" | "unchecked" | "preparing" | "approvals_syncing") | None => {
            MergeStateStatus::Unknown
        }
        Some(_) => MergeStateStatus::Blocked,
    }
}

#[async_trait]
impl PlatformService for GitLabService {
    async fn get_pr_details(&self, pr_number: u64) -> Result<PullRequestDetails> {
        debug!(mr_iid = pr_number, "getting MR details");

        let mr = self.get_mr(pr_number).await?;

        let state = match mr.state.as_str() {
            "opened" | "locked" => PrState::Open,
            "merged" => PrState::Merged,
            _ => PrState::Closed,
        };

        let details = PullRequestDetails {
            number: mr.iid,
            title: mr.title,
            state,
            head_ref: mr.source_branch,
            head_sha: mr
                .sha
                .ok_or_else(|| Error::GitLabApi(format!("MR !{pr_number} has no head sha")))?,
            base_ref: mr.target_branch,
            html_url: mr.web_url,
        };

        debug!(mr_iid = pr_number, state = ?details.state, "got MR details");
        Ok(details)
    }

    async fn list_check_runs(&self, commit_ref: &str) -> Result<Vec<CheckRun>> {
        debug!(commit_ref, "listing commit statuses");
        let pipeline_required = self.pipeline_must_succeed().await?;

        let url = self.project_url(&format!(
            "/repository/commits/{}/statuses",
            urlencoding::encode(commit_ref)
        ));
        let statuses: Vec<CommitStatus> = self.get_all(&url, "commit statuses").await?;

        let runs: Vec<CheckRun> = statuses
            .into_iter()
            .map(|s| check_run_from_status(s, pipeline_required))
            .collect::<Result<_>>()?;
        debug!(commit_ref, count = runs.len(), pipeline_required, "listed commit statuses");
        Ok(runs)
    }

    async fn get_branch_protection(&self, branch: &str) -> Result<Option<BranchProtection>> {
        debug!(branch, "getting branch protection");
        let url = self.project_url(&format!(
            "/protected_branches/{}",
            urlencoding::encode(branch)
        ));

        let protected: ProtectedBranch = match self.get_json(&url, "protected branch").await {
            Ok(p) => p,
            Err(Error::NotFound(_)) => {
                debug!(branch, "branch is not protected");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let required_approvals = match self
            .get_json::<ProjectApprovals>(&self.project_url("/approvals"), "project approvals")
            .await
        {
            Ok(a) => a.approvals_before_merge,
            Err(e) => {
                debug!(branch, error = %e, "approval rules unavailable");
                0
            }
        };

        debug!(branch = %protected.name, required_approvals, "got branch protection");
        Ok(Some(BranchProtection {
            // GitLab gates on the whole pipeline; per-job requirement is set on the runs
            required_checks: Vec::new(),
            required_approvals,
        }))
    }

    async fn get_merge_state(&self, pr_number: u64) -> Result<MergeState> {
        debug!(mr_iid = pr_number, "getting merge state");

        let mr = self.get_mr(pr_number).await?;

        let approvals: MrApprovals = self
            .get_json(
                &self.project_url(&format!("/merge_requests/{pr_number}/approvals")),
                "approvals",
            )
            .await?;

        let review_decision = if mr.detailed_merge_status.as_deref() == Some("requested_changes") {
            ReviewDecision::ChangesRequested
        } else if approvals.approvals_required == 0 {
            ReviewDecision::None
        } else if approvals.approved && approvals.approvals_left == 0 {
            ReviewDecision::Approved
        } else {
            ReviewDecision::ReviewRequired
        };

        let discussions: Vec<Discussion> = self
            .get_all(
                &self.project_url(&format!("/merge_requests/{pr_number}/discussions")),
                "discussions",
            )
            .await?;
        let unresolved = discussions
            .iter()
            .filter(|d| d.notes.iter().any(|n| n.resolvable && !n.resolved))
            .count();

        let auto_merge = mr.merge_when_pipeline_succeeds.then(|| AutoMergeRequest {
            enabled_at: mr.updated_at,
            method: if mr.squash {
                MergeMethod::Squash
            } else {
                MergeMethod::Merge
            },
            enabled_by: mr.merge_user.as_ref().map(|u| u.username.clone()),
        });

        let state = MergeState {
            status: merge_state_status(&mr),
            review_decision,
            unresolved_thread_count: u32::try_from(unresolved).unwrap_or(u32::MAX),
            is_draft: mr.draft,
            auto_merge,
        };

        debug!(
            mr_iid = pr_number,
            status = %state.status,
            review = %state.review_decision,
            unresolved = state.unresolved_thread_count,
            "got merge state"
        );
        Ok(state)
    }

    async fn get_check_log(&self, check: &CheckRun) -> Result<String> {
        debug!(job_id = check.id, "fetching job trace");
        let url = self.project_url(&format!("/jobs/{}/trace", check.id));
        self.send(self.client.get(&url), "job trace")
            .await?
            .text()
            .await
            .map_err(|e| Error::Transport(format!("failed to read job trace: {e}")))
    }

    async fn merge_pr(&self, pr_number: u64, method: MergeMethod) -> Result<MergeResult> {
        debug!(mr_iid = pr_number, %method, "merging MR");

        // Get MR details for commit message (squash needs title/description)
        let mr = self.get_mr(pr_number).await?;

        let url = self.project_url(&format!("/merge_requests/{pr_number}/merge"));

        let body = match method {
            MergeMethod::Squash => serde_json::json!({
                "squash": true,
                "squash_commit_message": format!(
                    "{} (!{})\n\n{}",
                    mr.title,
                    pr_number,
                    mr.description.unwrap_or_default()
                )
            }),
            MergeMethod::Merge => serde_json::json!({}),
            MergeMethod::Rebase => serde_json::json!({
                "merge_method": "rebase"
            }),
        };

        let response: MergeResponse = self
            .send(self.client.put(&url).json(&body), "merge")
            .await?
            .json()
            .await
            .map_err(|e| Error::GitLabApi(format!("failed to parse merge response: {e}")))?;

        let merged = response.state == "merged";
        let merge_result = MergeResult {
            merged,
            sha: response.squash_commit_sha.or(response.merge_commit_sha),
            message: (!merged).then(|| format!("merge request is {}", response.state)),
        };

        debug!(
            mr_iid = pr_number,
            merged = merge_result.merged,
            sha = ?merge_result.sha,
            "merge complete"
        );
        Ok(merge_result)
    }

    fn config(&self) -> &PlatformConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(name: &str, status: &str, allow_failure: bool) -> CommitStatus {
        CommitStatus {
            id: 1,
            name: name.to_string(),
            status: status.to_string(),
            allow_failure,
            started_at: None,
            finished_at: None,
            target_url: None,
            description: None,
        }
    }

    #[test]
    fn test_job_status_mapping() {
        let run = check_run_from_status(status("rspec", "failed", false), true).unwrap();
        assert_eq!(run.conclusion, Some(CheckConclusion::Failure));
        assert!(run.is_required);

        let run = check_run_from_status(status("lint", "failed", true), true).unwrap();
        assert_eq!(run.conclusion, Some(CheckConclusion::Neutral));
        assert!(!run.is_required);

        let run = check_run_from_status(status("deploy", "manual", false), false).unwrap();
        assert_eq!(run.conclusion, Some(CheckConclusion::ActionRequired));
        assert!(!run.is_required);

        let run = check_run_from_status(status("build", "created", false), true).unwrap();
        assert_eq!(run.status, CheckStatus::Queued);
        assert!(run.conclusion.is_none());
    }

    #[test]
    fn test_canceling_job_is_still_running() {
        let run = check_run_from_status(status("rspec", "canceling", false), true).unwrap();
        assert_eq!(run.status, CheckStatus::InProgress);
        assert!(run.conclusion.is_none());

        let run = check_run_from_status(status("rspec", "canceled", false), true).unwrap();
        assert_eq!(run.conclusion, Some(CheckConclusion::Cancelled));
    }

    #[test]
    fn test_unknown_job_status_is_rejected() {
        assert!(matches!(
            check_run_from_status(status("x", "exploded", false), true),
            Err(Error::UnrecognizedConclusion { .. })
        ));
    }
}
