//! GitLab token discovery

use super::{AuthSource, token_from_cli, token_from_env};
use crate::error::{Error, Result};

/// Resolved GitLab credentials
#[derive(Debug, Clone)]
pub struct GitLabAuthConfig {
    /// API token
    pub token: String,
    /// Where the token came from
    pub source: AuthSource,
}

/// Resolve a GitLab token from `GITLAB_TOKEN`/`GL_TOKEN` or the glab config.
pub async fn get_gitlab_auth(host: Option<&str>) -> Result<GitLabAuthConfig> {
    if let Some(token) = token_from_env(&["GITLAB_TOKEN", "GL_TOKEN"]) {
        return Ok(GitLabAuthConfig {
            token,
            source: AuthSource::EnvVar,
        });
    }

    let host = host.unwrap_or("gitlab.com");
    token_from_cli("glab", &["config", "get", "token", "--host", host])
        .await
        .map(|token| GitLabAuthConfig {
            token,
            source: AuthSource::Cli,
        })
        .ok_or_else(|| {
            Error::Auth(
                "no GitLab token found; set GITLAB_TOKEN or run 'glab auth login'".to_string(),
            )
        })
}
