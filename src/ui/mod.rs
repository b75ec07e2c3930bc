//! Terminal output helpers: status marks, tables and a fetch spinner.
//!
//! Everything here writes to stdout and degrades to plain text when stdout
//! is not a terminal.

use comfy_table::{presets, Attribute, Cell, CellAlignment, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::time::Duration;

use crate::models::{Platform, Priority, SyncOutcome};

/// Check if stdout is a terminal.
pub fn is_terminal() -> bool {
    std::io::stdout().is_terminal()
}

/// Status types for colored output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    Warning,
    Info,
    Skipped,
}

impl From<SyncOutcome> for Status {
    fn from(outcome: SyncOutcome) -> Self {
        match outcome {
            SyncOutcome::Ok => Status::Success,
            SyncOutcome::Partial => Status::Warning,
            SyncOutcome::Failed => Status::Error,
            SyncOutcome::Skipped => Status::Skipped,
        }
    }
}

pub fn status_icon(status: Status) -> &'static str {
    match status {
        Status::Success => "✓",
        Status::Error => "✗",
        Status::Warning => "⚠",
        Status::Info => "ℹ",
        Status::Skipped => "○",
    }
}

/// Icon per platform id
pub fn platform_icon(platform: &str) -> &'static str {
    match Platform::from_id(platform) {
        Platform::Orcid => "🆔",
        Platform::SemanticScholar => "🧠",
        Platform::Arxiv => "📝",
        Platform::GoogleScholar => "🔎",
        Platform::CrossRef => "🔗",
        Platform::Other(_) => "📄",
    }
}

/// Print a styled status line.
pub fn print_status(status: Status, msg: &str) {
    let icon = status_icon(status);
    if !is_terminal() {
        println!("{} {}", icon, msg);
        return;
    }
    match status {
        Status::Success => println!("{} {}", icon.green().bold(), msg),
        Status::Error => println!("{} {}", icon.red().bold(), msg),
        Status::Warning => println!("{} {}", icon.yellow().bold(), msg),
        Status::Info => println!("{} {}", icon.cyan().bold(), msg),
        Status::Skipped => println!("{} {}", icon.dimmed(), msg.dimmed()),
    }
}

/// Print a section header.
pub fn print_section(title: &str) {
    println!();
    if is_terminal() {
        println!("{}", format!("━━━ {} ━━━", title).bold().cyan());
    } else {
        println!("=== {} ===", title);
    }
}

/// Print a divider line.
pub fn print_divider() {
    let line = "─".repeat(60);
    if is_terminal() {
        println!("{}", line.dimmed());
    } else {
        println!("{}", line);
    }
}

/// Priority label coloured by urgency
pub fn priority_label(priority: Priority) -> String {
    let label = priority.as_str().to_uppercase();
    if !is_terminal() {
        return label;
    }
    match priority {
        Priority::High => label.red().bold().to_string(),
        Priority::Medium => label.yellow().bold().to_string(),
        Priority::Low => label.dimmed().to_string(),
    }
}

/// Table with the house style and the given header
pub fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );
    table
}

/// Right-aligned cell for numbers
pub fn number_cell(value: impl ToString) -> Cell {
    Cell::new(value.to_string()).set_alignment(CellAlignment::Right)
}

/// Format a number with commas.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Spinner shown while platforms are fetched
pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    /// Visible only on a terminal and when not quiet
    pub fn new(msg: &str, visible: bool) -> Self {
        let pb = if visible && is_terminal() {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self { pb }
    }

    pub fn set_message(&self, msg: &str) {
        self.pb.set_message(msg.to_string());
    }

    /// Remove the spinner line
    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}
