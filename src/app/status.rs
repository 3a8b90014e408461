//! Operator-facing status lines on stdout

use crate::pipeline::StatsSnapshot;
use colored::Colorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Failure,
}

/// `[label] detail`, with the label coloured by kind when enabled
pub fn format_status(kind: StatusKind, label: &str, detail: &str, color: bool) -> String {
    let tag = format!("[{}]", label);
    if !color {
        return format!("{} {}", tag, detail);
    }
    let tag = match kind {
        StatusKind::Info => tag.cyan().bold(),
        StatusKind::Success => tag.green().bold(),
        StatusKind::Failure => tag.bright_red().bold(),
    };
    format!("{} {}", tag, detail)
}

pub fn print_status(kind: StatusKind, label: &str, detail: &str, color: bool) {
    println!("{}", format_status(kind, label, detail, color));
}

/// Summary printed once the pipeline has stopped
pub fn summary_detail(stats: &StatsSnapshot) -> String {
    format!(
        "{} persisted, {} republished, {} dropped ({} classified)",
        stats.persisted, stats.republished, stats.dropped, stats.classified
    )
}

/// The stopped summary as one JSON object, for json log setups
pub fn summary_json(stats: &StatsSnapshot) -> String {
    serde_json::to_string(stats).unwrap_or_else(|_| summary_detail(stats))
}
