//! Mock platform service for testing
//!
//! These are test utilities - not all may be used in current tests but are
//! available for future test development.

#![allow(dead_code)]

use async_trait::async_trait;
use merge_gate::error::{Error, Result};
use merge_gate::platform::PlatformService;
use merge_gate::types::{
    BranchProtection, CheckRun, MergeMethod, MergeResult, MergeState, PlatformConfig,
    PullRequestDetails,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Error to inject in place of a response
///
/// `Error` is not `Clone`, so scripts hold a recipe and build a fresh error
/// each time the reply is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockError {
    Transport,
    RateLimited(Option<Duration>),
    NotFound,
    Unauthenticated,
    Api(String),
}

impl MockError {
    fn build(&self, what: &str) -> Error {
        match self {
            Self::Transport => Error::Transport(format!("{what}: connection reset")),
            Self::RateLimited(retry_after) => Error::RateLimited {
                retry_after: *retry_after,
            },
            Self::NotFound => Error::NotFound(what.to_string()),
            Self::Unauthenticated => Error::Unauthenticated(what.to_string()),
            Self::Api(msg) => Error::GitHubApi(format!("{what}: {msg}")),
        }
    }
}

/// One scripted reply
pub type Reply<T> = std::result::Result<T, MockError>;

/// Replies served in order; the last one repeats forever
struct Script<T> {
    replies: Mutex<VecDeque<Reply<T>>>,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
        }
    }

    fn set(&self, reply: Reply<T>) {
        let mut replies = self.replies.lock().unwrap();
        replies.clear();
        replies.push_back(reply);
    }

    fn push(&self, reply: Reply<T>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn next(&self, what: &str) -> Result<T> {
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        match reply {
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => Err(e.build(what)),
            None => Err(Error::Internal(format!("{what}: no mock response configured"))),
        }
    }
}

/// Call record for every trait method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    GetPrDetails(u64),
    ListCheckRuns(String),
    GetBranchProtection(String),
    GetMergeState(u64),
    GetCheckLog(String),
    MergePr { pr_number: u64, method: MergeMethod },
}

/// Simple mock platform service for testing
///
/// This manually implements `PlatformService` rather than using mockall,
/// because mockall has issues with methods returning references.
///
/// Features:
/// - Scripted reply sequences per method (last reply repeats)
/// - Call tracking for verification
/// - Error injection for failure path testing
pub struct MockPlatformService {
    config: PlatformConfig,
    pr_details: Script<PullRequestDetails>,
    check_runs: Script<Vec<CheckRun>>,
    protection: Script<Option<BranchProtection>>,
    merge_state: Script<MergeState>,
    check_log: Script<String>,
    merge: Script<MergeResult>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockPlatformService {
    /// Create a new mock with the given config and no replies
    pub fn with_config(config: PlatformConfig) -> Self {
        Self {
            config,
            pr_details: Script::new(),
            check_runs: Script::new(),
            protection: Script::new(),
            merge_state: Script::new(),
            check_log: Script::new(),
            merge: Script::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    // === Single responses (replace any script) ===

    pub fn set_pr_details(&self, pr: PullRequestDetails) {
        self.pr_details.set(Ok(pr));
    }

    pub fn set_check_runs(&self, runs: Vec<CheckRun>) {
        self.check_runs.set(Ok(runs));
    }

    pub fn set_protection(&self, protection: Option<BranchProtection>) {
        self.protection.set(Ok(protection));
    }

    pub fn set_merge_state(&self, state: MergeState) {
        self.merge_state.set(Ok(state));
    }

    pub fn set_check_log(&self, log: &str) {
        self.check_log.set(Ok(log.to_string()));
    }

    pub fn set_merge_result(&self, result: MergeResult) {
        self.merge.set(Ok(result));
    }

    // === Scripted sequences ===

    pub fn push_pr_details(&self, reply: Reply<PullRequestDetails>) {
        self.pr_details.push(reply);
    }

    pub fn push_check_runs(&self, reply: Reply<Vec<CheckRun>>) {
        self.check_runs.push(reply);
    }

    pub fn push_merge_state(&self, reply: Reply<MergeState>) {
        self.merge_state.push(reply);
    }

    pub fn push_merge_result(&self, reply: Reply<MergeResult>) {
        self.merge.push(reply);
    }

    // === Error injection methods ===

    pub fn fail_pr_details(&self, error: MockError) {
        self.pr_details.set(Err(error));
    }

    pub fn fail_check_runs(&self, error: MockError) {
        self.check_runs.set(Err(error));
    }

    pub fn fail_check_log(&self, error: MockError) {
        self.check_log.set(Err(error));
    }

    pub fn fail_merge(&self, error: MockError) {
        self.merge.set(Err(error));
    }

    // === Call verification ===

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn pr_details_calls(&self) -> usize {
        self.count(|c| matches!(c, MockCall::GetPrDetails(_)))
    }

    pub fn check_runs_calls(&self) -> usize {
        self.count(|c| matches!(c, MockCall::ListCheckRuns(_)))
    }

    pub fn merge_state_calls(&self) -> usize {
        self.count(|c| matches!(c, MockCall::GetMergeState(_)))
    }

    pub fn merge_calls(&self) -> Vec<(u64, MergeMethod)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                MockCall::MergePr { pr_number, method } => Some((*pr_number, *method)),
                _ => None,
            })
            .collect()
    }

    /// Assert `merge_pr` was never called
    pub fn assert_not_merged(&self) {
        let merges = self.merge_calls();
        assert!(merges.is_empty(), "expected no merge, got {merges:?}");
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PlatformService for MockPlatformService {
    async fn get_pr_details(&self, pr_number: u64) -> Result<PullRequestDetails> {
        self.record(MockCall::GetPrDetails(pr_number));
        self.pr_details.next(&format!("PR #{pr_number}"))
    }

    async fn list_check_runs(&self, commit_ref: &str) -> Result<Vec<CheckRun>> {
        self.record(MockCall::ListCheckRuns(commit_ref.to_string()));
        self.check_runs.next(&format!("check runs for {commit_ref}"))
    }

    async fn get_branch_protection(&self, branch: &str) -> Result<Option<BranchProtection>> {
        self.record(MockCall::GetBranchProtection(branch.to_string()));
        self.protection.next(&format!("branch {branch}"))
    }

    async fn get_merge_state(&self, pr_number: u64) -> Result<MergeState> {
        self.record(MockCall::GetMergeState(pr_number));
        self.merge_state.next(&format!("merge state of PR #{pr_number}"))
    }

    async fn get_check_log(&self, check: &CheckRun) -> Result<String> {
        self.record(MockCall::GetCheckLog(check.name.clone()));
        self.check_log.next(&format!("log of {}", check.name))
    }

    async fn merge_pr(&self, pr_number: u64, method: MergeMethod) -> Result<MergeResult> {
        self.record(MockCall::MergePr { pr_number, method });
        self.merge.next(&format!("merge of PR #{pr_number}"))
    }

    fn config(&self) -> &PlatformConfig {
        &self.config
    }
}
