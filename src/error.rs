//! Error types for merge-gate

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the fetch, poll, evaluate and auto-merge layers
#[derive(Debug, Error)]
pub enum Error {
    /// Bad PR/check identifier or malformed user input (never retried)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Remote resource (PR, commit, branch, check) does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// API rate limit hit; `retry_after` is the server hint when one was sent
    #[error("rate limited{}", .retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited {
        /// Server-provided wait before the next request
        retry_after: Option<Duration>,
    },

    /// Credentials missing, expired or rejected
    #[error("not authenticated: {0}")]
    Unauthenticated(String),

    /// Network-level failure talking to the remote
    #[error("transport error: {0}")]
    Transport(String),

    /// GitHub API returned an unexpected response
    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    /// GitLab API returned an unexpected response
    #[error("GitLab API error: {0}")]
    GitLabApi(String),

    /// Transient fetch errors persisted past the retry budget
    #[error("fetch failed after {attempts} attempt(s): {last}")]
    FetchExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Last error observed
        last: Box<Error>,
    },

    /// Auto-merge requirements are not met
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A status/conclusion pair outside the known taxonomy
    #[error("unrecognized check result: status={status}, conclusion={conclusion}")]
    UnrecognizedConclusion {
        /// Raw status value
        status: String,
        /// Raw conclusion value (`none` when absent)
        conclusion: String,
    },

    /// An auto-merge transition that the current state does not allow
    #[error("invalid auto-merge transition: {0}")]
    InvalidTransition(String),

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration file or value problem
    #[error("config error: {0}")]
    Config(String),

    /// Token discovery failed
    #[error("authentication setup failed: {0}")]
    Auth(String),

    /// Remote URL could not be mapped to a supported platform
    #[error("no supported remote: {0}")]
    UnsupportedRemote(String),

    /// Internal invariant broken or unexpected local failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the poller may retry the failed fetch.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transport(_))
    }

    /// Exit code for the CLI error convention.
    ///
    /// `0` and `5`/`6` are outcome codes chosen by commands, never by errors.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidInput(_)
            | Self::Config(_)
            | Self::UnsupportedRemote(_)
            | Self::InvalidTransition(_) => 1,
            Self::NotFound(_) => 2,
            Self::RateLimited { .. }
            | Self::Transport(_)
            | Self::GitHubApi(_)
            | Self::GitLabApi(_)
            | Self::UnrecognizedConclusion { .. }
            | Self::Internal(_) => 3,
            Self::FetchExhausted { last, .. } => last.exit_code(),
            Self::Unauthenticated(_) | Self::Auth(_) => 4,
            Self::PreconditionFailed(_) => 6,
            Self::Cancelled => 130,
        }
    }

    /// Map an HTTP status (plus optional retry hint) onto the error taxonomy.
    pub(crate) fn from_status(status: u16, retry_after: Option<Duration>, context: String) -> Self {
        match status {
            401 => Self::Unauthenticated(context),
            404 => Self::NotFound(context),
            429 => Self::RateLimited { retry_after },
            403 if retry_after.is_some() => Self::RateLimited { retry_after },
            500..=599 => Self::Transport(format!("{context} (HTTP {status})")),
            _ => Self::Internal(format!("{context} (HTTP {status})")),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return Self::from_status(status.as_u16(), None, e.to_string());
        }
        if e.is_decode() {
            return Self::Internal(format!("failed to decode response: {e}"));
        }
        Self::Transport(e.to_string())
    }
}

impl From<octocrab::Error> for Error {
    fn from(e: octocrab::Error) -> Self {
        match e {
            octocrab::Error::GitHub { source, .. } => {
                let status = source.status_code.as_u16();
                match status {
                    401 => Self::Unauthenticated(source.message),
                    404 => Self::NotFound(source.message),
                    429 => Self::RateLimited { retry_after: None },
                    403 if source.message.to_lowercase().contains("rate limit") => {
                        Self::RateLimited { retry_after: None }
                    }
                    500..=599 => Self::Transport(source.message),
                    _ => Self::GitHubApi(source.message),
                }
            }
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(Error::Transport("reset".into()).is_transient());
        assert!(Error::RateLimited { retry_after: None }.is_transient());
        assert!(!Error::NotFound("pr".into()).is_transient());
        assert!(!Error::Unauthenticated("token".into()).is_transient());
        assert!(!Error::InvalidInput("x".into()).is_transient());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(Error::NotFound("x".into()).exit_code(), 2);
        assert_eq!(Error::Transport("x".into()).exit_code(), 3);
        assert_eq!(Error::Unauthenticated("x".into()).exit_code(), 4);
        assert_eq!(Error::PreconditionFailed("x".into()).exit_code(), 6);
    }

    #[test]
    fn test_fetch_exhausted_uses_last_error_code() {
        let err = Error::FetchExhausted {
            attempts: 3,
            last: Box::new(Error::RateLimited {
                retry_after: Some(Duration::from_secs(30)),
            }),
        };
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("retry after 30s"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(
            Error::from_status(404, None, "pr".into()),
            Error::NotFound(_)
        ));
        assert!(matches!(
            Error::from_status(401, None, "pr".into()),
            Error::Unauthenticated(_)
        ));
        assert!(matches!(
            Error::from_status(403, Some(Duration::from_secs(5)), "pr".into()),
            Error::RateLimited { .. }
        ));
        assert!(matches!(
            Error::from_status(502, None, "pr".into()),
            Error::Transport(_)
        ));
    }
}
