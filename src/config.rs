//! User configuration in `$XDG_CONFIG_HOME/merge-gate/config.toml`.
//!
//! Every key is optional. Precedence, lowest first: built-in defaults, the
//! config file, `MERGE_GATE_*` environment variables, command-line flags.

use crate::classify::StalePolicy;
use crate::error::{Error, Result};
use crate::poll::{BackoffPolicy, MAX_TIMEOUT, MergeStatePolicy, PollOptions, RetryPolicy};
use crate::readiness::EvaluateOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Directory name under the user config dir.
const CONFIG_DIR: &str = "merge-gate";

/// Config filename.
const CONFIG_FILE: &str = "config.toml";

/// Overrides `[poll] timeout_secs`.
pub const TIMEOUT_ENV: &str = "MERGE_GATE_TIMEOUT";

/// Overrides `[poll] initial_interval_secs`.
pub const INTERVAL_ENV: &str = "MERGE_GATE_INTERVAL";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Check polling
    pub poll: PollSection,
    /// Transient fetch retry
    pub retry: RetrySection,
    /// Unknown merge-state re-fetching
    pub merge_state: MergeStateSection,
    /// Readiness evaluation
    pub readiness: ReadinessSection,
    /// Remote selection
    pub remote: RemoteSection,
}

/// `[poll]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollSection {
    /// Delay after the first tick
    pub initial_interval_secs: u64,
    /// Delay cap
    pub max_interval_secs: u64,
    /// Growth factor per tick
    pub multiplier: f64,
    /// Default wait budget
    pub timeout_secs: u64,
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            initial_interval_secs: 5,
            max_interval_secs: 60,
            multiplier: 1.5,
            timeout_secs: 600,
        }
    }
}

/// `[retry]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    /// Attempts per fetch, including the first
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay_ms: u64,
    /// Delay cap, also applied to rate-limit hints
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
        }
    }
}

/// `[merge_state]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeStateSection {
    /// Fetches while the platform reports `unknown`
    pub max_attempts: u32,
    /// Delay between those fetches
    pub interval_secs: u64,
}

impl Default for MergeStateSection {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval_secs: 2,
        }
    }
}

/// `[readiness]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessSection {
    /// `block` or `ignore`
    pub stale_policy: StalePolicy,
    /// Treat cancelled checks as passing
    pub ignore_cancelled: bool,
}

/// `[remote]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteSection {
    /// Default host for self-hosted GitHub Enterprise or GitLab
    pub host: Option<String>,
}

impl Config {
    /// Default config file location, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Load from an explicit path (which must exist) or the default location,
    /// then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) if !path.exists() => {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            Some(path) => Self::load_from(path)?,
            None => match Self::default_path() {
                Some(path) => Self::load_from(&path)?,
                None => Self::default(),
            },
        };

        config.apply_overrides(
            std::env::var(TIMEOUT_ENV).ok().as_deref(),
            std::env::var(INTERVAL_ENV).ok().as_deref(),
        )?;
        Ok(config)
    }

    /// Apply timeout/interval overrides given in seconds.
    ///
    /// An interval above the configured cap raises the cap with it.
    pub fn apply_overrides(&mut self, timeout: Option<&str>, interval: Option<&str>) -> Result<()> {
        if let Some(raw) = timeout {
            self.poll.timeout_secs = parse_secs(TIMEOUT_ENV, raw)?;
        }
        if let Some(raw) = interval {
            let secs = parse_secs(INTERVAL_ENV, raw)?;
            self.poll.initial_interval_secs = secs;
            self.poll.max_interval_secs = self.poll.max_interval_secs.max(secs);
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        let poll = &self.poll;
        if poll.timeout_secs > MAX_TIMEOUT.as_secs() {
            return Err(Error::Config(format!(
                "poll.timeout_secs must be at most {}",
                MAX_TIMEOUT.as_secs()
            )));
        }
        if poll.initial_interval_secs == 0 {
            return Err(Error::Config(
                "poll.initial_interval_secs must be at least 1".to_string(),
            ));
        }
        if poll.max_interval_secs < poll.initial_interval_secs {
            return Err(Error::Config(
                "poll.max_interval_secs must not be below poll.initial_interval_secs".to_string(),
            ));
        }
        if !poll.multiplier.is_finite() || poll.multiplier < 1.0 {
            return Err(Error::Config("poll.multiplier must be >= 1.0".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.merge_state.max_attempts == 0 {
            return Err(Error::Config(
                "merge_state.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Poll-tick backoff.
    pub const fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_secs(self.poll.initial_interval_secs),
            max: Duration::from_secs(self.poll.max_interval_secs),
            multiplier: self.poll.multiplier,
        }
    }

    /// Fetch retry policy.
    pub const fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    /// Unknown merge-state policy.
    pub const fn merge_state_policy(&self) -> MergeStatePolicy {
        MergeStatePolicy {
            max_attempts: self.merge_state.max_attempts,
            interval: Duration::from_secs(self.merge_state.interval_secs),
            retry: self.retry(),
        }
    }

    /// Default wait budget.
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.poll.timeout_secs)
    }

    /// Evaluation options with the configured readiness settings.
    pub const fn evaluate_options(&self) -> EvaluateOptions {
        EvaluateOptions {
            ignore_ci: false,
            ignore_threads: false,
            ignore_reviews: false,
            ignore_cancelled: self.readiness.ignore_cancelled,
            stale_policy: self.readiness.stale_policy,
        }
    }

    /// Poll options selecting every check.
    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            timeout: self.timeout(),
            backoff: self.backoff(),
            retry: self.retry(),
            required_only: false,
            names: None,
            stale_policy: self.readiness.stale_policy,
            ignore_cancelled: self.readiness.ignore_cancelled,
        }
    }
}

fn parse_secs(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{name} must be a whole number of seconds, got '{raw}'")))
}
