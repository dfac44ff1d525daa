//! Terminal styling helpers
//!
//! Output goes through `anstream`, which strips ANSI codes when stdout is not
//! a terminal, so styling here is unconditional.

use indicatif::ProgressStyle;
use owo_colors::{OwoColorize, Style};
use std::fmt::Display;

/// Semantic styles for CLI output
pub trait Stylize {
    /// Secondary, low-importance text
    fn muted(&self) -> String;
    /// Headings and key values
    fn emphasis(&self) -> String;
    /// Names and identifiers
    fn accent(&self) -> String;
    /// Good outcomes
    fn success(&self) -> String;
    /// Things needing attention
    fn warn(&self) -> String;
    /// Failures
    fn error(&self) -> String;
}

impl<T: Display + ?Sized> Stylize for T {
    fn muted(&self) -> String {
        paint(self, Style::new().dimmed())
    }

    fn emphasis(&self) -> String {
        paint(self, Style::new().bold())
    }

    fn accent(&self) -> String {
        paint(self, Style::new().cyan())
    }

    fn success(&self) -> String {
        paint(self, Style::new().green())
    }

    fn warn(&self) -> String {
        paint(self, Style::new().yellow())
    }

    fn error(&self) -> String {
        paint(self, Style::new().red().bold())
    }
}

fn paint<T: Display + ?Sized>(value: &T, style: Style) -> String {
    value.to_string().style(style).to_string()
}

/// Green check mark
pub fn check() -> String {
    "✓".success()
}

/// Red cross
pub fn cross() -> String {
    "✗".error()
}

/// Yellow dot for pending items
pub fn dot() -> String {
    "●".warn()
}

/// Spinner style shared by long-running commands
pub fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "])
}

/// Render `text` as a terminal hyperlink when the terminal supports it.
pub fn hyperlink(text: &str, url: &str) -> String {
    if supports_hyperlinks::on(supports_hyperlinks::Stream::Stdout) {
        terminal_link::Link::new(text, url).to_string()
    } else {
        text.to_string()
    }
}
