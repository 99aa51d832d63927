//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Run
//!
//! ```text
//! Processing photos/a.jpg → web/a.png
//! Processing photos/b.jpg → web/b.png
//!     Failed photos/b.jpg: Operation chain failed: scale failed: ...
//! Processed 1 image.
//! ```
//!
//! With `--verbose`, skips and writes are listed too:
//!
//! ```text
//! Skipped photos/c.jpg: web/c.png is up to date
//! Skipped photos/notes.txt: no mapping
//!     Wrote web/a.png (png)
//! ```
//!
//! ## Check
//!
//! ```text
//! process    photos/a.jpg → web/a.png
//! up to date photos/c.jpg → web/c.png
//! unmapped   photos/notes.txt
//!
//! 1 to process, 1 up to date, 1 unmapped
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::batch::{PlanEntry, PlannedAction};
use crate::process::{ProcessEvent, Severity, SkipReason};
use std::path::Path;

/// Summary wording. Nothing is printed when no image was written.
pub fn summary_line(written: usize) -> Option<String> {
    match written {
        0 => None,
        1 => Some("Processed 1 image.".to_string()),
        n => Some(format!("Processed {n} images.")),
    }
}

fn show(path: &Path) -> String {
    path.display().to_string()
}

/// Format one progress event.
///
/// Verbose events produce no lines unless `verbose` is set.
pub fn format_process_event(event: &ProcessEvent, verbose: bool) -> Vec<String> {
    if event.severity() == Severity::Verbose && !verbose {
        return Vec::new();
    }
    match event {
        ProcessEvent::Started {
            source,
            destination,
        } => vec![format!(
            "Processing {} \u{2192} {}",
            show(source),
            show(destination)
        )],
        ProcessEvent::Written {
            destination,
            format,
        } => vec![format!("    Wrote {} ({})", show(destination), format)],
        ProcessEvent::Skipped {
            source,
            destination,
            reason,
        } => {
            let why = match (reason, destination) {
                (SkipReason::Unmapped, _) => "no mapping".to_string(),
                (SkipReason::UpToDate, Some(dest)) => format!("{} is up to date", show(dest)),
                (SkipReason::UpToDate, None) => "destination is up to date".to_string(),
                (SkipReason::NoDecoder, _) => "no decoder available".to_string(),
            };
            vec![format!("Skipped {}: {}", show(source), why)]
        }
        ProcessEvent::Failed {
            source, message, ..
        } => vec![format!("    Failed {}: {}", show(source), message)],
        ProcessEvent::Summary { written } => summary_line(*written).into_iter().collect(),
    }
}

/// Format the `check` listing.
pub fn format_plan(entries: &[PlanEntry]) -> Vec<String> {
    let mut lines = Vec::new();
    let (mut process, mut fresh, mut unmapped) = (0, 0, 0);

    for entry in entries {
        let label = match entry.action {
            PlannedAction::Process => {
                process += 1;
                "process"
            }
            PlannedAction::UpToDate => {
                fresh += 1;
                "up to date"
            }
            PlannedAction::Unmapped => {
                unmapped += 1;
                "unmapped"
            }
        };
        match &entry.destination {
            Some(dest) => lines.push(format!(
                "{:<10} {} \u{2192} {}",
                label,
                show(&entry.source),
                show(dest)
            )),
            None => lines.push(format!("{:<10} {}", label, show(&entry.source))),
        }
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "{process} to process, {fresh} up to date, {unmapped} unmapped"
    ));
    lines
}

/// Print the `check` listing to stdout.
pub fn print_plan(entries: &[PlanEntry]) {
    for line in format_plan(entries) {
        println!("{}", line);
    }
}

/// Format the `formats` listing: one name per line, sorted.
pub fn format_formats<'a>(formats: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut names: Vec<String> = formats.into_iter().cloned().collect();
    names.sort();
    names
}
