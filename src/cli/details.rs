//! `check-details` command

use crate::cli::checks::CheckRow;
use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, hyperlink};
use crate::cli::{EXIT_OK, format_duration, print_json};
use anstream::println;
use merge_gate::classify::classify_snapshot;
use merge_gate::error::{Error, Result};
use merge_gate::types::{CheckOutput, CheckRun};
use serde::Serialize;
use tracing::debug;

/// Lines of log kept from the end of a job log
const LOG_TAIL_LINES: usize = 200;

#[derive(Serialize)]
struct CheckDetails<'a> {
    #[serde(flatten)]
    row: CheckRow,
    suite: Option<&'a str>,
    started_at: Option<String>,
    completed_at: Option<String>,
    output: Option<&'a CheckOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log: Option<String>,
}

fn tail(log: &str, lines: usize) -> String {
    let all: Vec<&str> = log.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

async fn fetch_log(ctx: &CommandContext, run: &CheckRun) -> Result<Option<String>> {
    match ctx.platform.get_check_log(run).await {
        Ok(log) => Ok(Some(tail(&log, LOG_TAIL_LINES))),
        Err(Error::NotFound(what)) => {
            debug!(check = %run.name, what, "no log available");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Run the check-details command
pub async fn run_check_details(ctx: &CommandContext, name: &str, include_logs: bool) -> Result<u8> {
    let (pr, snapshot) = ctx.fetch_checks().await?;
    let classified = classify_snapshot(&snapshot.runs)?;
    let matches: Vec<_> = classified
        .iter()
        .filter(|c| c.run.matches_name(name))
        .collect();

    if matches.is_empty() {
        return Err(Error::NotFound(format!(
            "check '{name}' on PR #{} ({})",
            pr.number,
            snapshot.head_sha.get(..7).unwrap_or(&snapshot.head_sha)
        )));
    }

    let mut details = Vec::with_capacity(matches.len());
    for check in matches {
        let log = if include_logs {
            fetch_log(ctx, check.run).await?
        } else {
            None
        };
        details.push(CheckDetails {
            row: CheckRow::new(&snapshot, check),
            suite: check.run.suite.as_deref(),
            started_at: check.run.started_at.map(|t| t.to_rfc3339()),
            completed_at: check.run.completed_at.map(|t| t.to_rfc3339()),
            output: check.run.output.as_ref(),
            log,
        });
    }

    if ctx.json {
        print_json(&details)?;
        return Ok(EXIT_OK);
    }

    for (i, d) in details.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_details(d, include_logs);
    }
    Ok(EXIT_OK)
}

fn label(name: &str) -> String {
    format!("{name:<12}").muted()
}

fn print_details(d: &CheckDetails<'_>, include_logs: bool) {
    println!("{}", d.row.name.emphasis());
    if let Some(suite) = d.suite {
        println!("  {} {}", label("suite"), suite);
    }
    println!("  {} {}", label("status"), d.row.status);
    if let Some(conclusion) = &d.row.conclusion {
        println!("  {} {}", label("conclusion"), conclusion);
    }
    println!("  {} {}", label("kind"), d.row.kind);
    println!(
        "  {} {}",
        label("required"),
        if d.row.required { "yes" } else { "no" }
    );
    if let Some(started) = &d.started_at {
        println!("  {} {}", label("started"), started);
    }
    if let Some(secs) = d.row.duration_secs {
        println!("  {} {}", label("duration"), format_duration(secs));
    }
    if let Some(url) = &d.row.details_url {
        println!("  {} {}", label("url"), hyperlink(url, url));
    }
    if let Some(output) = d.output {
        if let Some(title) = &output.title {
            println!("  {} {}", label("title"), title);
        }
        if output.annotations_count > 0 {
            println!("  {} {}", label("annotations"), output.annotations_count);
        }
        if let Some(summary) = output.summary.as_deref().filter(|s| !s.trim().is_empty()) {
            println!();
            for line in summary.lines() {
                println!("  {line}");
            }
        }
    }
    if include_logs {
        println!();
        match &d.log {
            Some(log) => {
                println!("{}", format!("Last {LOG_TAIL_LINES} log lines:").muted());
                println!("{log}");
            }
            None => println!("{}", "No log available for this check.".muted()),
        }
    }
}
