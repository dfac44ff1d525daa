//! Platform detection from git remote URLs

use crate::error::{Error, Result};
use crate::types::{Platform, PlatformConfig};
use regex::Regex;
use std::sync::LazyLock;

static SSH_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:ssh://)?[\w.-]+@(?P<host>[\w.-]+)(?::\d+)?[:/](?P<path>.+?)(?:\.git)?/*$")
        .unwrap_or_else(|e| unreachable!("invalid ssh regex: {e}"))
});

/// Detect which platform a host belongs to.
///
/// Self-hosted instances are recognised by a `github` or `gitlab` label in
/// the host name.
pub fn detect_platform(host: &str) -> Option<Platform> {
    let host = host.to_ascii_lowercase();
    if host == "github.com" || host.split('.').any(|label| label.contains("github")) {
        Some(Platform::GitHub)
    } else if host == "gitlab.com" || host.split('.').any(|label| label.contains("gitlab")) {
        Some(Platform::GitLab)
    } else {
        None
    }
}

/// Parse a remote URL (HTTPS or SSH) into a platform configuration.
pub fn parse_repo_info(remote_url: &str) -> Result<PlatformConfig> {
    let trimmed = remote_url.trim();
    let (host, path) = if let Ok(url) = url::Url::parse(trimmed)
        && matches!(url.scheme(), "http" | "https")
    {
        let host = url
            .host_str()
            .ok_or_else(|| Error::UnsupportedRemote(trimmed.to_string()))?
            .to_string();
        (host, url.path().to_string())
    } else if let Some(caps) = SSH_URL.captures(trimmed) {
        (caps["host"].to_string(), caps["path"].to_string())
    } else {
        return Err(Error::UnsupportedRemote(trimmed.to_string()));
    };

    let platform =
        detect_platform(&host).ok_or_else(|| Error::UnsupportedRemote(trimmed.to_string()))?;

    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let (owner, repo) = path
        .rsplit_once('/')
        .ok_or_else(|| Error::UnsupportedRemote(trimmed.to_string()))?;
    if owner.is_empty() || repo.is_empty() {
        return Err(Error::UnsupportedRemote(trimmed.to_string()));
    }
    // GitHub has no nested namespaces
    if platform == Platform::GitHub && owner.contains('/') {
        return Err(Error::UnsupportedRemote(trimmed.to_string()));
    }

    let default_host = match platform {
        Platform::GitHub => "github.com",
        Platform::GitLab => "gitlab.com",
    };

    Ok(PlatformConfig {
        platform,
        owner: owner.to_string(),
        repo: repo.to_string(),
        host: (host != default_host).then_some(host),
    })
}
