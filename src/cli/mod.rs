//! CLI commands for mgate

pub mod automerge;
pub mod checks;
pub mod context;
pub mod details;
pub mod ready;
pub mod style;
pub mod wait;

use indicatif::ProgressBar;
use merge_gate::error::Error;
use merge_gate::poll::{PollObserver, SelectionSummary};
use merge_gate::types::CheckSnapshot;
use std::path::PathBuf;
use std::time::Duration;
use style::{Stylize, spinner_style};

/// Exit code: PR is ready / all selected checks passed
pub const EXIT_OK: u8 = 0;
/// Exit code: no checks matched the selection
pub const EXIT_NO_MATCH: u8 = 2;
/// Exit code: nothing to do, the PR is already merged
pub const EXIT_ALREADY_MERGED: u8 = 5;
/// Exit code: not mergeable, checks failing or still pending
pub const EXIT_NOT_READY: u8 = 6;

/// Flags shared by every command
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    /// `owner/name` override
    pub repo: Option<String>,
    /// Self-hosted instance host
    pub host: Option<String>,
    /// Explicit config file
    pub config: Option<PathBuf>,
    /// Machine-readable output
    pub json: bool,
}

/// Spinner-backed poll observer; silent in JSON mode
pub struct CliProgress {
    spinner: Option<ProgressBar>,
}

impl CliProgress {
    /// Start a spinner with an initial message, or stay silent.
    pub fn new(message: &str, enabled: bool) -> Self {
        let spinner = enabled.then(|| {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(spinner_style());
            spinner.set_message(message.to_string());
            spinner.enable_steady_tick(Duration::from_millis(80));
            spinner
        });
        Self { spinner }
    }

    /// Remove the spinner from the terminal.
    pub fn finish(&self) {
        if let Some(spinner) = &self.spinner {
            spinner.finish_and_clear();
        }
    }

    fn set_message(&self, message: String) {
        if let Some(spinner) = &self.spinner {
            spinner.set_message(message);
        }
    }
}

impl PollObserver for CliProgress {
    fn on_tick(&self, tick: u32, snapshot: &CheckSnapshot, summary: &SelectionSummary) {
        let sha = snapshot.head_sha.get(..7).unwrap_or(&snapshot.head_sha);
        self.set_message(format!(
            "{} passing, {} failing, {} pending on {} {}",
            summary.passing.len(),
            summary.failing.len(),
            summary.pending.len(),
            sha.accent(),
            format!("(poll {tick})").muted()
        ));
    }

    fn on_retry(&self, attempt: u32, error: &Error, delay: Duration) {
        self.set_message(format!(
            "{} {}",
            format!("fetch failed ({error}),").warn(),
            format!("retry {attempt} in {}s", delay.as_secs()).muted()
        ));
    }
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> merge_gate::error::Result<()> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Internal(format!("failed to serialize output: {e}")))?;
    anstream::println!("{out}");
    Ok(())
}

/// Format a duration as `1h 2m`, `3m 4s` or `5s`.
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(5), "5s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(3725), "1h 2m");
        assert_eq!(format_duration(-3), "0s");
    }
}
