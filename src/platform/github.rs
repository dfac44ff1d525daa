//! GitHub platform service implementation

use crate::error::{Error, Result};
use crate::platform::PlatformService;
use crate::types::{
    AutoMergeRequest, BranchProtection, CheckConclusion, CheckOutput, CheckRun, CheckStatus,
    MergeMethod, MergeResult, MergeState, MergeStateStatus, Platform, PlatformConfig, PrState,
    PullRequestDetails, ReviewDecision,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Page size for REST list endpoints
const PER_PAGE: usize = 100;

/// App slug GitHub Actions reports for its check runs
const ACTIONS_APP: &str = "github-actions";

/// Path segment of Actions job URLs, which expose downloadable logs
const ACTIONS_RUN_PATH: &str = "/actions/runs/";

// REST response types

#[derive(Deserialize)]
struct CheckRunsPage {
    total_count: usize,
    check_runs: Vec<RawCheckRun>,
}

#[derive(Deserialize)]
struct RawCheckRun {
    id: u64,
    name: String,
    status: String,
    conclusion: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    html_url: Option<String>,
    details_url: Option<String>,
    output: Option<RawCheckOutput>,
    app: Option<RawApp>,
    check_suite: Option<RawCheckSuite>,
}

#[derive(Deserialize)]
struct RawCheckSuite {
    id: u64,
}

#[derive(Deserialize)]
struct WorkflowRunsPage {
    workflow_runs: Vec<RawWorkflowRun>,
}

#[derive(Deserialize)]
struct RawWorkflowRun {
    check_suite_id: Option<u64>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawCheckOutput {
    title: Option<String>,
    summary: Option<String>,
    #[serde(default)]
    annotations_count: u64,
}

#[derive(Deserialize)]
struct RawApp {
    slug: Option<String>,
}

#[derive(Deserialize)]
struct CombinedStatus {
    statuses: Vec<RawStatus>,
}

#[derive(Deserialize)]
struct RawStatus {
    id: u64,
    context: String,
    state: String,
    description: Option<String>,
    target_url: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct RawBranch {
    #[serde(default)]
    protected: bool,
    protection: Option<RawProtection>,
}

#[derive(Deserialize)]
struct RawProtection {
    required_status_checks: Option<RawRequiredChecks>,
}

#[derive(Deserialize)]
struct RawRequiredChecks {
    #[serde(default)]
    contexts: Vec<String>,
    #[serde(default)]
    checks: Vec<RawRequiredCheck>,
}

#[derive(Deserialize)]
struct RawRequiredCheck {
    context: String,
}

#[derive(Deserialize)]
struct RawRequiredReviews {
    #[serde(default)]
    required_approving_review_count: u32,
}

// GraphQL response types for merge state

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct MergeStateData {
    repository: Option<MergeStateRepository>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MergeStateRepository {
    pull_request: Option<GraphQlPullRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlPullRequest {
    mergeable: String,
    merge_state_status: String,
    review_decision: Option<String>,
    is_draft: bool,
    review_threads: ReviewThreads,
    auto_merge_request: Option<GraphQlAutoMerge>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewThreads {
    nodes: Vec<ReviewThread>,
    page_info: PageInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewThread {
    is_resolved: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlAutoMerge {
    enabled_at: Option<DateTime<Utc>>,
    merge_method: String,
    enabled_by: Option<GraphQlActor>,
}

#[derive(Deserialize)]
struct GraphQlActor {
    login: String,
}

const MERGE_STATE_QUERY: &str = r"
    query MergeState($owner: String!, $repo: String!, $number: Int!, $after: String) {
        repository(owner: $owner, name: $repo) {
            pullRequest(number: $number) {
                mergeable
                mergeStateStatus
                reviewDecision
                isDraft
                reviewThreads(first: 100, after: $after) {
                    nodes { isResolved }
                    pageInfo { hasNextPage endCursor }
                }
                autoMergeRequest {
                    enabledAt
                    mergeMethod
                    enabledBy { login }
                }
            }
        }
    }
";

/// GitHub service using octocrab for PR operations and raw HTTP for checks
pub struct GitHubService {
    client: Octocrab,
    config: PlatformConfig,
    /// Token for raw HTTP requests
    token: String,
    /// HTTP client for raw requests (checks, protection, GraphQL)
    http_client: Client,
    /// REST API base URL, without trailing slash
    api_base: String,
    /// GraphQL endpoint URL
    graphql_url: String,
}

impl GitHubService {
    /// Create a new GitHub service
    pub fn new(token: &str, owner: String, repo: String, host: Option<String>) -> Result<Self> {
        let (api_base, graphql_url) = host.as_ref().map_or_else(
            || {
                (
                    "https://api.github.com".to_string(),
                    "https://api.github.com/graphql".to_string(),
                )
            },
            |h| (format!("https://{h}/api/v3"), format!("https://{h}/api/graphql")),
        );
        Self::build(token, owner, repo, host, api_base, graphql_url)
    }

    /// Create a service against an explicit API base URL (proxies, test servers).
    ///
    /// GraphQL requests go to `{api_base}/graphql`.
    pub fn with_api_base(token: &str, owner: String, repo: String, api_base: &str) -> Result<Self> {
        let api_base = api_base.trim_end_matches('/').to_string();
        let graphql_url = format!("{api_base}/graphql");
        Self::build(token, owner, repo, None, api_base, graphql_url)
    }

    fn build(
        token: &str,
        owner: String,
        repo: String,
        host: Option<String>,
        api_base: String,
        graphql_url: String,
    ) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .base_uri(&api_base)
            .map_err(|e| Error::GitHubApi(e.to_string()))?
            .build()
            .map_err(|e| Error::GitHubApi(e.to_string()))?;

        let http_client = Client::builder()
            .user_agent("merge-gate")
            .build()
            .map_err(|e| Error::GitHubApi(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: PlatformConfig {
                platform: Platform::GitHub,
                owner,
                repo,
                host,
            },
            token: token.to_string(),
            http_client,
            api_base,
            graphql_url,
        })
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.api_base, self.config.owner, self.config.repo, path
        )
    }

    async fn get(&self, url: &str, what: &str) -> Result<Response> {
        let response = self
            .http_client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await?;
        check_response(response, what).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        self.get(url, what)
            .await?
            .json()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to parse {what}: {e}")))
    }

    /// Check runs from the Checks API (GitHub Actions and apps)
    async fn list_app_check_runs(&self, commit_ref: &str) -> Result<Vec<CheckRun>> {
        let mut raws = Vec::new();
        let mut page = 1;

        loop {
            let url = self.repo_url(&format!(
                "/commits/{}/check-runs?filter=latest&per_page={PER_PAGE}&page={page}",
                urlencoding::encode(commit_ref)
            ));
            let body: CheckRunsPage = self.get_json(&url, "check runs").await?;
            let fetched = body.check_runs.len();
            raws.extend(body.check_runs);

            if fetched < PER_PAGE || raws.len() >= body.total_count {
                break;
            }
            page += 1;
        }

        let labels = self.suite_labels(commit_ref, &raws).await;
        let runs: Vec<CheckRun> = raws
            .into_iter()
            .map(|raw| {
                let suite = raw
                    .check_suite
                    .as_ref()
                    .and_then(|s| labels.get(&s.id).cloned());
                check_run_from_raw(raw, suite)
            })
            .collect::<Result<_>>()?;

        debug!(commit_ref, count = runs.len(), "fetched check runs");
        Ok(runs)
    }

    /// Display label per check suite id.
    ///
    /// Every Actions workflow reports under the same app slug, so Actions
    /// suites are labelled with their workflow name. Labels still shared by
    /// several suites get the suite id appended.
    async fn suite_labels(&self, commit_ref: &str, raws: &[RawCheckRun]) -> HashMap<u64, String> {
        let mut slugs: HashMap<u64, Option<&str>> = HashMap::new();
        for raw in raws {
            if let Some(suite) = &raw.check_suite {
                slugs
                    .entry(suite.id)
                    .or_insert_with(|| raw.app.as_ref().and_then(|a| a.slug.as_deref()));
            }
        }

        let workflows = if slugs.values().any(|slug| *slug == Some(ACTIONS_APP)) {
            self.workflow_names(commit_ref).await
        } else {
            HashMap::new()
        };

        let mut labels: HashMap<u64, String> = slugs
            .into_iter()
            .filter_map(|(id, slug)| {
                let label = workflows.get(&id).cloned().or(slug.map(str::to_string))?;
                Some((id, label))
            })
            .collect();

        let mut uses: HashMap<String, usize> = HashMap::new();
        for label in labels.values() {
            *uses.entry(label.clone()).or_default() += 1;
        }
        for (id, label) in &mut labels {
            if uses.get(label.as_str()).is_some_and(|n| *n > 1) {
                *label = format!("{label}#{id}");
            }
        }
        labels
    }

    /// Workflow name per check suite id for the Actions runs on a commit
    async fn workflow_names(&self, commit_ref: &str) -> HashMap<u64, String> {
        let url = self.repo_url(&format!(
            "/actions/runs?head_sha={}&per_page={PER_PAGE}",
            urlencoding::encode(commit_ref)
        ));
        match self
            .get_json::<WorkflowRunsPage>(&url, "workflow runs")
            .await
        {
            Ok(page) => page
                .workflow_runs
                .into_iter()
                .filter_map(|run| Some((run.check_suite_id?, run.name?)))
                .collect(),
            Err(e) => {
                // suites fall back to their app slug and id
                debug!(commit_ref, error = %e, "workflow names unavailable");
                HashMap::new()
            }
        }
    }

    /// Legacy commit statuses (external CI services), mapped onto check runs
    async fn list_commit_statuses(&self, commit_ref: &str) -> Result<Vec<CheckRun>> {
        let url = self.repo_url(&format!(
            "/commits/{}/status?per_page={PER_PAGE}",
            urlencoding::encode(commit_ref)
        ));
        let combined: CombinedStatus = self.get_json(&url, "commit status").await?;

        let runs: Vec<CheckRun> = combined
            .statuses
            .into_iter()
            .map(check_run_from_status)
            .collect::<Result<_>>()?;
        debug!(commit_ref, count = runs.len(), "fetched commit statuses");
        Ok(runs)
    }

    async fn required_approvals(&self, branch: &str) -> u32 {
        let url = self.repo_url(&format!(
            "/branches/{}/protection/required_pull_request_reviews",
            urlencoding::encode(branch)
        ));
        match self
            .get_json::<RawRequiredReviews>(&url, "required reviews")
            .await
        {
            Ok(reviews) => reviews.required_approving_review_count,
            Err(e) => {
                // needs admin rights; the review decision covers the rest
                debug!(branch, error = %e, "required review count unavailable");
                0
            }
        }
    }

    async fn graphql<T: DeserializeOwned>(&self, body: &serde_json::Value) -> Result<T> {
        let response = self
            .http_client
            .post(&self.graphql_url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(body)
            .send()
            .await?;
        let response = check_response(response, "GraphQL query").await?;
        let parsed: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to parse GraphQL response: {e}")))?;

        if let Some(errors) = parsed.errors
            && !errors.is_empty()
        {
            if errors.iter().any(|e| e.kind.as_deref() == Some("NOT_FOUND")) {
                return Err(Error::NotFound(errors[0].message.clone()));
            }
            if errors.iter().any(|e| e.kind.as_deref() == Some("RATE_LIMITED")) {
                return Err(Error::RateLimited { retry_after: None });
            }
            let messages: Vec<_> = errors.into_iter().map(|e| e.message).collect();
            return Err(Error::GitHubApi(format!(
                "GraphQL error: {}",
                messages.join(", ")
            )));
        }

        parsed
            .data
            .ok_or_else(|| Error::GitHubApi("No data in GraphQL response".to_string()))
    }

    async fn query_merge_state(
        &self,
        pr_number: u64,
        after: Option<&str>,
    ) -> Result<GraphQlPullRequest> {
        let data: MergeStateData = self
            .graphql(&serde_json::json!({
                "query": MERGE_STATE_QUERY,
                "variables": {
                    "owner": self.config.owner,
                    "repo": self.config.repo,
                    "number": pr_number,
                    "after": after,
                }
            }))
            .await?;

        data.repository
            .and_then(|r| r.pull_request)
            .ok_or_else(|| Error::NotFound(format!("PR #{pr_number}")))
    }
}

/// Turn a non-success response into the matching error variant
async fn check_response(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = rate_limit_delay(&response);
    let body = response.text().await.unwrap_or_default();
    debug!(%status, what, "GitHub request failed");

    let context = if body.is_empty() {
        what.to_string()
    } else {
        format!("{what}: {}", body.trim())
    };
    Err(match Error::from_status(status.as_u16(), retry_after, context) {
        Error::Internal(msg) => Error::GitHubApi(msg),
        other => other,
    })
}

/// Delay hint from `retry-after` or an exhausted `x-ratelimit-*` window
fn rate_limit_delay(response: &Response) -> Option<Duration> {
    let headers = response.headers();
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(secs) = header("retry-after").and_then(|v| v.parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }
    if header("x-ratelimit-remaining") == Some("0") {
        let reset = header("x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok())?;
        let wait = (reset - Utc::now().timestamp()).max(1);
        return Some(Duration::from_secs(wait.unsigned_abs()));
    }
    None
}

fn check_run_from_raw(raw: RawCheckRun, suite: Option<String>) -> Result<CheckRun> {
    let status = CheckStatus::parse(&raw.status)?;
    let conclusion = match (status, raw.conclusion.as_deref()) {
        (CheckStatus::Completed, Some(c)) => Some(CheckConclusion::parse(status, c)?),
        _ => None,
    };
    Ok(CheckRun {
        id: raw.id,
        name: raw.name,
        suite: suite.or_else(|| raw.app.and_then(|a| a.slug)),
        status,
        conclusion,
        started_at: raw.started_at,
        completed_at: raw.completed_at,
        is_required: false,
        details_url: raw.html_url.or(raw.details_url),
        output: raw.output.map(|o| CheckOutput {
            title: o.title,
            summary: o.summary,
            annotations_count: o.annotations_count,
        }),
    })
}

fn check_run_from_status(raw: RawStatus) -> Result<CheckRun> {
    let (status, conclusion) = match raw.state.as_str() {
        "pending" => (CheckStatus::InProgress, None),
        "success" => (CheckStatus::Completed, Some(CheckConclusion::Success)),
        "failure" | "error" => (CheckStatus::Completed, Some(CheckConclusion::Failure)),
        other => {
            return Err(Error::UnrecognizedConclusion {
                status: other.to_string(),
                conclusion: "none".to_string(),
            });
        }
    };
    Ok(CheckRun {
        id: raw.id,
        name: raw.context,
        suite: None,
        status,
        conclusion,
        started_at: raw.created_at,
        completed_at: conclusion.and(raw.updated_at),
        is_required: false,
        details_url: raw.target_url,
        output: raw.description.map(|d| CheckOutput {
            title: None,
            summary: Some(d),
            annotations_count: 0,
        }),
    })
}

fn merge_state_status(mergeable: &str, merge_state_status: &str) -> MergeStateStatus {
    match (mergeable, merge_state_status) {
        ("UNKNOWN", _) | (_, "UNKNOWN") => MergeStateStatus::Unknown,
        ("CONFLICTING", _) => MergeStateStatus::Conflicting,
        (_, "DIRTY") => MergeStateStatus::Dirty,
        (_, "BEHIND") => MergeStateStatus::Behind,
        (_, "BLOCKED") => MergeStateStatus::Blocked,
        (_, "UNSTABLE") => MergeStateStatus::Unstable,
        // Drafts surface through is_draft
        (_, "CLEAN" | "HAS_HOOKS" | "DRAFT") => MergeStateStatus::Mergeable,
        (_, other) => {
            debug!(state = other, "unmapped merge state status, treating as unknown");
            MergeStateStatus::Unknown
        }
    }
}

fn review_decision(raw: Option<&str>) -> ReviewDecision {
    match raw {
        Some("APPROVED") => ReviewDecision::Approved,
        Some("CHANGES_REQUESTED") => ReviewDecision::ChangesRequested,
        Some("REVIEW_REQUIRED") => ReviewDecision::ReviewRequired,
        _ => ReviewDecision::None,
    }
}

fn merge_method(raw: &str) -> MergeMethod {
    match raw {
        "SQUASH" => MergeMethod::Squash,
        "REBASE" => MergeMethod::Rebase,
        _ => MergeMethod::Merge,
    }
}

#[async_trait]
impl PlatformService for GitHubService {
    async fn get_pr_details(&self, pr_number: u64) -> Result<PullRequestDetails> {
        debug!(pr_number, "getting PR details");

        let pr = self
            .client
            .pulls(&self.config.owner, &self.config.repo)
            .get(pr_number)
            .await?;

        // Determine PR state from GitHub's state field and merged_at
        let state = match pr.state {
            Some(octocrab::models::IssueState::Open) => PrState::Open,
            Some(octocrab::models::IssueState::Closed) if pr.merged_at.is_some() => PrState::Merged,
            // IssueState is non-exhaustive, so use wildcard for Closed and any future variants
            Some(_) | None => PrState::Closed,
        };

        let details = PullRequestDetails {
            number: pr.number,
            title: pr.title.clone().unwrap_or_default(),
            state,
            head_ref: pr.head.ref_field.clone(),
            head_sha: pr.head.sha.clone(),
            base_ref: pr.base.ref_field.clone(),
            html_url: pr
                .html_url
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        };

        debug!(pr_number, state = ?details.state, head_sha = %details.head_sha, "got PR details");
        Ok(details)
    }

    async fn list_check_runs(&self, commit_ref: &str) -> Result<Vec<CheckRun>> {
        // GitHub has two CI systems: check runs (Actions, apps) and legacy
        // commit statuses. Both count towards branch protection.
        let mut runs = self.list_app_check_runs(commit_ref).await?;
        runs.extend(self.list_commit_statuses(commit_ref).await?);
        Ok(runs)
    }

    async fn get_branch_protection(&self, branch: &str) -> Result<Option<BranchProtection>> {
        debug!(branch, "getting branch protection");
        let url = self.repo_url(&format!("/branches/{}", urlencoding::encode(branch)));
        let raw: RawBranch = self.get_json(&url, "branch").await?;

        if !raw.protected {
            debug!(branch, "branch is not protected");
            return Ok(None);
        }

        let mut required_checks = Vec::new();
        if let Some(checks) = raw.protection.and_then(|p| p.required_status_checks) {
            required_checks.extend(checks.contexts);
            for check in checks.checks {
                if !required_checks.contains(&check.context) {
                    required_checks.push(check.context);
                }
            }
        }

        let protection = BranchProtection {
            required_checks,
            required_approvals: self.required_approvals(branch).await,
        };
        debug!(
            branch,
            required = protection.required_checks.len(),
            "got branch protection"
        );
        Ok(Some(protection))
    }

    async fn get_merge_state(&self, pr_number: u64) -> Result<MergeState> {
        debug!(pr_number, "getting merge state");

        let pr = self.query_merge_state(pr_number, None).await?;
        let mut unresolved = pr
            .review_threads
            .nodes
            .iter()
            .filter(|t| !t.is_resolved)
            .count();

        let mut page_info = pr.review_threads.page_info;
        while page_info.has_next_page {
            let Some(cursor) = page_info.end_cursor.as_deref() else {
                break;
            };
            let next = self.query_merge_state(pr_number, Some(cursor)).await?;
            unresolved += next
                .review_threads
                .nodes
                .iter()
                .filter(|t| !t.is_resolved)
                .count();
            page_info = next.review_threads.page_info;
        }

        let state = MergeState {
            status: merge_state_status(&pr.mergeable, &pr.merge_state_status),
            review_decision: review_decision(pr.review_decision.as_deref()),
            unresolved_thread_count: u32::try_from(unresolved).unwrap_or(u32::MAX),
            is_draft: pr.is_draft,
            auto_merge: pr.auto_merge_request.map(|a| AutoMergeRequest {
                enabled_at: a.enabled_at,
                method: merge_method(&a.merge_method),
                enabled_by: a.enabled_by.map(|actor| actor.login),
            }),
        };

        debug!(
            pr_number,
            status = %state.status,
            review = %state.review_decision,
            unresolved = state.unresolved_thread_count,
            "got merge state"
        );
        Ok(state)
    }

    async fn get_check_log(&self, check: &CheckRun) -> Result<String> {
        let is_actions_job = check
            .details_url
            .as_deref()
            .is_some_and(|url| url.contains(ACTIONS_RUN_PATH));
        if !is_actions_job {
            return Err(Error::NotFound(format!(
                "logs for '{}' (only GitHub Actions jobs expose logs)",
                check.qualified_name()
            )));
        }

        debug!(check_id = check.id, "fetching job log");
        let url = self.repo_url(&format!("/actions/jobs/{}/logs", check.id));
        let text = self
            .get(&url, "job log")
            .await?
            .text()
            .await
            .map_err(|e| Error::Transport(format!("Failed to read job log: {e}")))?;
        Ok(text)
    }

    async fn merge_pr(&self, pr_number: u64, method: MergeMethod) -> Result<MergeResult> {
        debug!(pr_number, %method, "merging PR");

        let octocrab_method = match method {
            MergeMethod::Squash => octocrab::params::pulls::MergeMethod::Squash,
            MergeMethod::Merge => octocrab::params::pulls::MergeMethod::Merge,
            MergeMethod::Rebase => octocrab::params::pulls::MergeMethod::Rebase,
        };

        let pulls = self.client.pulls(&self.config.owner, &self.config.repo);

        // For squash, use PR title and body as commit message
        let result = if method == MergeMethod::Squash {
            let pr = pulls.get(pr_number).await?;
            let mut builder = pulls.merge(pr_number).method(octocrab_method);
            builder = builder.title(format!(
                "{} (#{})",
                pr.title.as_deref().unwrap_or_default(),
                pr_number
            ));
            if let Some(ref body) = pr.body {
                builder = builder.message(body);
            }
            builder.send().await
        } else {
            pulls.merge(pr_number).method(octocrab_method).send().await
        }?;

        let merge_result = MergeResult {
            merged: result.merged,
            sha: result.sha,
            message: result.message,
        };

        debug!(
            pr_number,
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

    #[test]
    fn test_merge_state_status_mapping() {
        assert_eq!(merge_state_status("MERGEABLE", "CLEAN"), MergeStateStatus::Mergeable);
        assert_eq!(merge_state_status("MERGEABLE", "HAS_HOOKS"), MergeStateStatus::Mergeable);
        assert_eq!(merge_state_status("CONFLICTING", "DIRTY"), MergeStateStatus::Conflicting);
        assert_eq!(merge_state_status("MERGEABLE", "DIRTY"), MergeStateStatus::Dirty);
        assert_eq!(merge_state_status("MERGEABLE", "BEHIND"), MergeStateStatus::Behind);
        assert_eq!(merge_state_status("MERGEABLE", "BLOCKED"), MergeStateStatus::Blocked);
        assert_eq!(merge_state_status("MERGEABLE", "UNSTABLE"), MergeStateStatus::Unstable);
        assert_eq!(merge_state_status("UNKNOWN", "CLEAN"), MergeStateStatus::Unknown);
        assert_eq!(merge_state_status("MERGEABLE", "UNKNOWN"), MergeStateStatus::Unknown);
    }

    #[test]
    fn test_draft_is_not_reported_as_protection_block() {
        assert_eq!(merge_state_status("MERGEABLE", "DRAFT"), MergeStateStatus::Mergeable);
    }

    #[test]
    fn test_review_decision_mapping() {
        assert_eq!(review_decision(Some("APPROVED")), ReviewDecision::Approved);
        assert_eq!(
            review_decision(Some("CHANGES_REQUESTED")),
            ReviewDecision::ChangesRequested
        );
        assert_eq!(review_decision(None), ReviewDecision::None);
    }

    #[test]
    fn test_status_mapping() {
        let raw = RawStatus {
            id: 9,
            context: "ci/circleci".to_string(),
            state: "error".to_string(),
            description: Some("boom".to_string()),
            target_url: None,
            created_at: None,
            updated_at: None,
        };
        let run = check_run_from_status(raw).unwrap();
        assert_eq!(run.status, CheckStatus::Completed);
        assert_eq!(run.conclusion, Some(CheckConclusion::Failure));
        assert_eq!(run.name, "ci/circleci");
    }

    #[test]
    fn test_pending_status_has_no_conclusion() {
        let raw = RawStatus {
            id: 1,
            context: "deploy".to_string(),
            state: "pending".to_string(),
            description: None,
            target_url: None,
            created_at: None,
            updated_at: None,
        };
        let run = check_run_from_status(raw).unwrap();
        assert_eq!(run.status, CheckStatus::InProgress);
        assert!(run.conclusion.is_none());
    }
}
