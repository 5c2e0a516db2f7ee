use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

use crate::apply::{AcceptMask, ApplySummary};
use crate::diff::{colorize_entry, ChangeKind, DiffEntry};
use crate::document::{FieldId, DESCRIPTORS};
use crate::editor::FormatReport;
use crate::errors::{StudioError, Tone};

pub fn confirm(prompt: &str) -> bool {
    print!("{} [y/N]: ", prompt);
    let _ = io::stdout().flush();
    let mut s = String::new();
    if io::stdin().read_line(&mut s).is_ok() {
        let ans = s.trim().to_lowercase();
        ans == "y" || ans == "yes"
    } else {
        false
    }
}

/// Ask which entries to accept until the answer parses. Empty input means all.
pub fn prompt_mask(len: usize) -> AcceptMask {
    loop {
        print!("Accept which changes? [all / none / 1,3-5] (default all): ");
        let _ = io::stdout().flush();
        let mut s = String::new();
        if io::stdin().read_line(&mut s).is_err() {
            return AcceptMask::none(len);
        }
        let answer = if s.trim().is_empty() { "all" } else { s.trim() };
        match AcceptMask::parse(answer, len) {
            Ok(mask) => return mask,
            Err(e) => println!("{}", e.to_string().yellow()),
        }
    }
}

pub fn print_diff_dashboard(entries: &[DiffEntry]) {
    let mut added = 0usize;
    let mut removed = 0usize;
    let mut changed = 0usize;
    for e in entries {
        match e.kind() {
            ChangeKind::Added => added += 1,
            ChangeKind::Removed => removed += 1,
            ChangeKind::Changed => changed += 1,
        }
    }

    println!(
        "\n{}",
        "┏━━━━━━━━━━━━━━━━━━━━━━━━ Changes ━━━━━━━━━━━━━━━━━━━━━━━━┓".bold()
    );
    println!(
        "  {}: {}   {}: {}   {}: {}",
        "Added".green().bold(), added,
        "Removed".red().bold(), removed,
        "Changed".yellow().bold(), changed
    );
    println!("{}", "┗━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━┛".bold());

    if entries.is_empty() {
        println!("(documents are equivalent)");
        return;
    }
    for (i, e) in entries.iter().enumerate() {
        println!("{}", colorize_entry(i, e));
    }
    println!();
}

pub fn print_apply_dashboard(sum: &ApplySummary) {
    println!(
        "\n{}",
        "┏━━━━━━━━━━━━━━━━━━━━━━━ Apply Results ━━━━━━━━━━━━━━━━━━━┓".bold()
    );
    println!(
        "  {}: {}   {}: {}   {}: {}",
        "Set".green().bold(), sum.set,
        "Removed".red().bold(), sum.removed,
        "Skipped".bold(), sum.skipped
    );
    println!("{}", "┗━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━┛".bold());
}

pub fn print_format_report(report: &FormatReport) {
    for name in &report.formatted {
        println!("{} {}", "formatted".green(), name);
    }
    for (name, err) in &report.failed {
        println!("{} {}: {}", "failed".red(), name, err);
    }
    let total = report.formatted.len() + report.failed.len();
    if total == 0 {
        println!("(no presets)");
    } else {
        println!("\n{}/{} presets formatted", report.formatted.len(), total);
    }
}

pub fn print_fields() {
    for d in DESCRIPTORS {
        println!("{:<20} {}", d.name.bold(), d.path.join(" > "));
    }
}

pub fn print_candidates(field: FieldId, items: &[&str]) {
    if items.is_empty() {
        println!("(no saved values for {})", field.name());
        return;
    }
    for item in items {
        println!("  {item}");
    }
}

/// One-line status in the error's tone; cancellation is not shown as a failure.
pub fn report(err: &StudioError) {
    let line = err.to_string();
    match err.tone() {
        Tone::Neutral => eprintln!("{}", line.dimmed()),
        Tone::Warning => eprintln!("{} {}", "warning:".yellow().bold(), line),
        Tone::Error => eprintln!("{} {}", "error:".red().bold(), line),
    }
}

pub fn stream_spinner(label: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(label.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
