//! Authentication for GitHub and GitLab
//!
//! Supports environment variables first, then CLI-based auth (gh, glab).

mod github;
mod gitlab;

pub use github::{GitHubAuthConfig, get_github_auth};
pub use gitlab::{GitLabAuthConfig, get_gitlab_auth};

use tokio::process::Command;
use tracing::debug;

/// Source of authentication token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    /// Token from CLI tool (gh or glab)
    Cli,
    /// Token from environment variable
    EnvVar,
}

/// First non-empty value among the given environment variables.
fn token_from_env(vars: &[&str]) -> Option<String> {
    vars.iter().find_map(|var| {
        std::env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .inspect(|_| debug!(var, "using token from environment"))
    })
}

/// Ask a CLI tool for its stored token; `None` if the tool is missing or fails.
async fn token_from_cli(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().await.ok()?;
    if !output.status.success() {
        debug!(program, status = %output.status, "CLI token lookup failed");
        return None;
    }
    let token = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!token.is_empty()).then_some(token)
}
