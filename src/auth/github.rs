//! GitHub token discovery

use super::{AuthSource, token_from_cli, token_from_env};
use crate::error::{Error, Result};

/// Resolved GitHub credentials
#[derive(Debug, Clone)]
pub struct GitHubAuthConfig {
    /// API token
    pub token: String,
    /// Where the token came from
    pub source: AuthSource,
}

/// Resolve a GitHub token from `GH_TOKEN`/`GITHUB_TOKEN` or `gh auth token`.
///
/// Enterprise hosts also consult `GH_ENTERPRISE_TOKEN`.
pub async fn get_github_auth(host: Option<&str>) -> Result<GitHubAuthConfig> {
    let vars: &[&str] = if host.is_some() {
        &["GH_ENTERPRISE_TOKEN", "GITHUB_ENTERPRISE_TOKEN", "GH_TOKEN", "GITHUB_TOKEN"]
    } else {
        &["GH_TOKEN", "GITHUB_TOKEN"]
    };
    if let Some(token) = token_from_env(vars) {
        return Ok(GitHubAuthConfig {
            token,
            source: AuthSource::EnvVar,
        });
    }

    let mut args = vec!["auth", "token"];
    if let Some(h) = host {
        args.extend(["--hostname", h]);
    }
    token_from_cli("gh", &args)
        .await
        .map(|token| GitHubAuthConfig {
            token,
            source: AuthSource::Cli,
        })
        .ok_or_else(|| {
            Error::Auth("no GitHub token found; set GH_TOKEN or run 'gh auth login'".to_string())
        })
}
