//! `checks` command - one fetch, classified table

use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, check, cross, dot, hyperlink};
use crate::cli::{EXIT_OK, format_duration, print_json};
use anstream::println;
use merge_gate::classify::{CheckKind, ClassifiedCheck, classify_snapshot};
use merge_gate::error::Result;
use merge_gate::types::{CheckSnapshot, PullRequestDetails};
use serde::Serialize;

/// One check in command output
#[derive(Debug, Clone, Serialize)]
pub struct CheckRow {
    /// Display name (qualified when ambiguous)
    pub name: String,
    /// Raw status
    pub status: String,
    /// Raw conclusion
    pub conclusion: Option<String>,
    /// Classified kind
    pub kind: CheckKind,
    /// Whether the check will change without a re-run
    pub terminal: bool,
    /// Required by branch protection
    pub required: bool,
    /// Superseded by a newer run
    pub superseded: bool,
    /// Wall-clock duration in seconds
    pub duration_secs: Option<i64>,
    /// Link to the run
    pub details_url: Option<String>,
}

impl CheckRow {
    /// Build a row from a classified check.
    pub fn new(snapshot: &CheckSnapshot, check: &ClassifiedCheck<'_>) -> Self {
        Self {
            name: snapshot.display_name(check.run),
            status: check.run.status.to_string(),
            conclusion: check.run.conclusion.map(|c| c.to_string()),
            kind: check.kind,
            terminal: check.terminal,
            required: check.run.is_required,
            superseded: check.superseded,
            duration_secs: check.run.duration().map(|d| d.num_seconds()),
            details_url: check.run.details_url.clone(),
        }
    }

    /// Render as one table line.
    pub fn render(&self, name_width: usize) -> String {
        let icon = match self.kind {
            CheckKind::Passing => check(),
            CheckKind::Failing | CheckKind::Cancelled | CheckKind::Blocked => cross(),
            CheckKind::Pending | CheckKind::Stale => dot(),
        };
        let padded = format!("{:<name_width$}", self.name);
        let name = self
            .details_url
            .as_deref()
            .map_or_else(|| padded.clone(), |url| hyperlink(&padded, url));
        let kind = match self.kind {
            CheckKind::Passing => self.kind.to_string().success(),
            CheckKind::Failing | CheckKind::Cancelled | CheckKind::Blocked => {
                self.kind.to_string().error()
            }
            CheckKind::Pending | CheckKind::Stale => self.kind.to_string().warn(),
        };

        let mut line = format!("  {icon} {name}  {kind:<10}");
        if self.required {
            line.push_str(&format!("  {}", "required".accent()));
        }
        if self.superseded {
            line.push_str(&format!("  {}", "superseded".muted()));
        }
        if let Some(secs) = self.duration_secs {
            line.push_str(&format!("  {}", format_duration(secs).muted()));
        }
        line
    }
}

#[derive(Serialize)]
struct ChecksOutput<'a> {
    pr: &'a PullRequestDetails,
    head_sha: &'a str,
    checks: Vec<CheckRow>,
}

/// Rows for a snapshot, optionally only required checks.
pub fn check_rows(snapshot: &CheckSnapshot, required_only: bool) -> Result<Vec<CheckRow>> {
    Ok(classify_snapshot(&snapshot.runs)?
        .iter()
        .filter(|c| !required_only || c.run.is_required)
        .map(|c| CheckRow::new(snapshot, c))
        .collect())
}

/// Print a table of rows with aligned names.
pub fn print_rows(rows: &[CheckRow]) {
    let width = rows.iter().map(|r| r.name.chars().count()).max().unwrap_or(0);
    for row in rows {
        println!("{}", row.render(width));
    }
}

/// Run the checks command
pub async fn run_checks(ctx: &CommandContext, required_only: bool) -> Result<u8> {
    let (pr, snapshot) = ctx.fetch_checks().await?;
    let rows = check_rows(&snapshot, required_only)?;

    if ctx.json {
        print_json(&ChecksOutput {
            pr: &pr,
            head_sha: &snapshot.head_sha,
            checks: rows,
        })?;
        return Ok(EXIT_OK);
    }

    println!(
        "{} {} {}",
        format!("PR #{}", pr.number).emphasis(),
        pr.title,
        format!("@ {}", snapshot.head_sha.get(..7).unwrap_or(&snapshot.head_sha)).muted()
    );

    if rows.is_empty() {
        let what = if required_only { "required checks" } else { "checks" };
        println!("{}", format!("No {what} reported.").muted());
        return Ok(EXIT_OK);
    }

    print_rows(&rows);
    Ok(EXIT_OK)
}
