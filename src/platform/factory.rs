//! Platform service factory

use crate::auth::{get_github_auth, get_gitlab_auth};
use crate::error::Result;
use crate::platform::{GitHubService, GitLabService, PlatformService};
use crate::types::{Platform, PlatformConfig};
use tracing::debug;

/// Create a platform service for the given configuration.
///
/// Resolves a token for the platform first; fails with `Auth` when none
/// can be found.
pub async fn create_platform_service(config: &PlatformConfig) -> Result<Box<dyn PlatformService>> {
    debug!(platform = %config.platform, owner = %config.owner, repo = %config.repo, "creating platform service");
    match config.platform {
        Platform::GitHub => {
            let auth = get_github_auth(config.host.as_deref()).await?;
            let service = GitHubService::new(
                &auth.token,
                config.owner.clone(),
                config.repo.clone(),
                config.host.clone(),
            )?;
            Ok(Box::new(service))
        }
        Platform::GitLab => {
            let auth = get_gitlab_auth(config.host.as_deref()).await?;
            let service = GitLabService::new(
                auth.token,
                config.owner.clone(),
                config.repo.clone(),
                config.host.clone(),
            )?;
            Ok(Box::new(service))
        }
    }
}
