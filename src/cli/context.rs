//! Shared command context for CLI commands
//!
//! Resolves the repository, loads configuration and creates the platform
//! service once, so every command starts from the same setup.

use crate::cli::GlobalArgs;
use merge_gate::config::Config;
use merge_gate::error::{Error, Result};
use merge_gate::fetch::fetch_pr_checks;
use merge_gate::platform::{PlatformService, create_platform_service, parse_repo_info};
use merge_gate::poll::{CancelSignal, NoopObserver, fetch_with_retry};
use merge_gate::types::{CheckSnapshot, PlatformConfig, PrRef, PullRequestDetails};
use tokio::process::Command;
use tracing::debug;

/// Shared context for CLI commands that interact with the platform
pub struct CommandContext {
    /// Loaded configuration (file + env)
    pub config: Config,
    /// Platform service (GitHub/GitLab)
    pub platform: Box<dyn PlatformService>,
    /// Resolved repository
    pub repo: PlatformConfig,
    /// PR/MR number
    pub pr_number: u64,
    /// JSON output requested
    pub json: bool,
    /// Ctrl-C cancellation
    pub cancel: CancelSignal,
}

impl CommandContext {
    /// Create a context for a PR reference.
    ///
    /// The repository comes from the reference itself, then `--repo`, then
    /// the `origin` remote of the current git checkout.
    pub async fn new(globals: &GlobalArgs, pr: &str, cancel: CancelSignal) -> Result<Self> {
        let config = Config::load(globals.config.as_deref())?;
        let pr_ref = PrRef::parse(pr)?;
        let host = url_host(pr)
            .or_else(|| globals.host.clone())
            .or_else(|| config.remote.host.clone());

        let repo = resolve_repo(&pr_ref, globals.repo.as_deref(), host.as_deref()).await?;
        debug!(platform = %repo.platform, owner = %repo.owner, repo = %repo.repo, pr = pr_ref.number, "resolved repository");

        let platform = create_platform_service(&repo).await?;

        Ok(Self {
            config,
            platform,
            repo,
            pr_number: pr_ref.number,
            json: globals.json,
            cancel,
        })
    }

    /// Fetch PR details and a check snapshot, retrying transient failures.
    pub async fn fetch_checks(&self) -> Result<(PullRequestDetails, CheckSnapshot)> {
        let platform = self.platform.as_ref();
        let pr_number = self.pr_number;
        fetch_with_retry(&self.config.retry(), &self.cancel, &NoopObserver, move || {
            fetch_pr_checks(platform, pr_number)
        })
        .await
    }

    /// Fetch PR details, retrying transient failures.
    pub async fn fetch_pr(&self) -> Result<PullRequestDetails> {
        let platform = self.platform.as_ref();
        let pr_number = self.pr_number;
        fetch_with_retry(&self.config.retry(), &self.cancel, &NoopObserver, move || {
            platform.get_pr_details(pr_number)
        })
        .await
    }
}

async fn resolve_repo(
    pr_ref: &PrRef,
    repo_flag: Option<&str>,
    host: Option<&str>,
) -> Result<PlatformConfig> {
    let named = match (&pr_ref.repo, repo_flag) {
        (Some((owner, repo)), _) => Some(format!("{owner}/{repo}")),
        (None, Some(flag)) => Some(flag.trim_matches('/').to_string()),
        (None, None) => None,
    };

    if let Some(path) = named {
        if !path.contains('/') {
            return Err(Error::InvalidInput(format!(
                "repository must be 'owner/name', got '{path}'"
            )));
        }
        let host = host.unwrap_or("github.com");
        return parse_repo_info(&format!("https://{host}/{path}"));
    }

    let url = origin_url().await?;
    parse_repo_info(&url)
}

async fn origin_url() -> Result<String> {
    let output = Command::new("git")
        .args(["remote", "get-url", "origin"])
        .output()
        .await
        .map_err(|e| Error::UnsupportedRemote(format!("failed to run git: {e}")))?;
    if !output.status.success() {
        return Err(Error::UnsupportedRemote(
            "no 'origin' remote here; pass --repo owner/name".to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn url_host(pr: &str) -> Option<String> {
    url::Url::parse(pr.trim())
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .and_then(|u| u.host_str().map(ToString::to_string))
}
