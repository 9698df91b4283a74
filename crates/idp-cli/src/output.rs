//! Terminal rendering for command results.
//!
//! Results go to stdout; status notices about failures and partial results go
//! to stderr so piped XML or JSON stays clean.

use colored::{ColoredString, Colorize};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::config::OutputFormat;

/// Severity of a one-line status notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The command did what was asked.
    Done,
    /// Informational detail.
    Note,
    /// Partial success.
    Warn,
    /// The command failed.
    Fail,
}

impl Notice {
    fn marker(self) -> ColoredString {
        match self {
            Self::Done => "ok".green().bold(),
            Self::Note => "--".blue(),
            Self::Warn => "warn".yellow().bold(),
            Self::Fail => "error".red().bold(),
        }
    }

    const fn to_stderr(self) -> bool {
        matches!(self, Self::Warn | Self::Fail)
    }
}

/// Prints a status line.
pub fn notice(kind: Notice, message: &str) {
    if kind.to_stderr() {
        eprintln!("{} {message}", kind.marker());
    } else {
        println!("{} {message}", kind.marker());
    }
}

/// Renders result rows. Quiet mode prints nothing.
pub fn render_rows<T: Tabled + Serialize>(rows: &[T], format: OutputFormat) -> crate::CliResult<()> {
    match format {
        OutputFormat::Table if rows.is_empty() => notice(Notice::Note, "nothing to show"),
        OutputFormat::Table => println!("{}", Table::new(rows).with(Style::psql())),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
        OutputFormat::Quiet => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_problems_go_to_stderr() {
        assert!(Notice::Fail.to_stderr());
        assert!(Notice::Warn.to_stderr());
        assert!(!Notice::Done.to_stderr());
        assert!(!Notice::Note.to_stderr());
    }

    #[test]
    fn markers_are_distinct() {
        colored::control::set_override(false);
        let markers: Vec<String> = [Notice::Done, Notice::Note, Notice::Warn, Notice::Fail]
            .into_iter()
            .map(|n| n.marker().to_string())
            .collect();
        assert_eq!(markers, ["ok", "--", "warn", "error"]);
    }
}
