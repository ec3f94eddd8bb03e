//! Terminal output for the `auv` commands.
//!
//! All user-facing terminal output goes through [`OutputFormatter`].
//! Diagnostics go through `tracing` and stay silent unless a log level is set.

use crate::file_organizer::{OrganizeReport, Plan};
use crate::history::{OperationKind, TimelineEntry, TimelineId};
use crate::rollback::RollbackReport;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::PathBuf;

/// Styled terminal output: ✓ for success, ✗ (stderr) for errors, ⚠ for
/// warnings, cyan for info.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints `✓ message`.
    ///
    /// ```no_run
    /// use auv::output::OutputFormatter;
    /// OutputFormatter::success("Organized 3 files");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message to stderr in red.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates a progress bar for file moves.
    ///
    /// The length is set by the organizer once the plan is known.
    pub fn create_progress_bar() -> ProgressBar {
        let pb = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }
        pb
    }

    /// Prints what a dry run would move.
    pub fn plan(plan: &Plan) {
        for category in &plan.disabled {
            Self::warning(&format!(
                "{} is disabled; enable it with `auv config enable {}`",
                category,
                category.name()
            ));
        }
        if plan.batches.is_empty() {
            Self::info("No files to organize.");
            return;
        }

        for batch in &plan.batches {
            Self::header(&format!(
                "{} → {}",
                batch.category,
                batch.destination.display()
            ));
            for file in &batch.files {
                let name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Self::plain(&format!("  - {}", name));
            }
        }
        Self::dry_run_notice(&format!(
            "{} files would be moved; nothing was changed.",
            plan.file_count()
        ));
    }

    /// Prints a per-category summary table of an organize run.
    pub fn organize_report(report: &OrganizeReport) {
        for category in &report.disabled {
            Self::warning(&format!(
                "{} is disabled; enable it with `auv config enable {}`",
                category,
                category.name()
            ));
        }
        if report.batches.is_empty() {
            Self::info("No files to organize.");
            return;
        }

        Self::header("SUMMARY");
        let rows: Vec<(String, usize, Option<TimelineId>)> = report
            .batches
            .iter()
            .map(|b| (b.category.to_string(), b.result.moved.len(), b.timeline))
            .collect();
        let width = rows
            .iter()
            .map(|(name, _, _)| name.len())
            .max()
            .unwrap_or(0)
            .max(8);

        println!(
            "{:<width$} | {:<10} | {}",
            "Category".bold(),
            "Files".bold(),
            "Timeline".bold(),
            width = width
        );
        println!("{}", "-".repeat(width + 26));
        for (name, count, timeline) in &rows {
            println!(
                "{:<width$} | {:<10} | {}",
                name,
                plural(*count, "file").green(),
                timeline.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
                width = width
            );
        }
        println!("{}", "-".repeat(width + 26));
        println!(
            "{:<width$} | {}",
            "Total".bold(),
            plural(report.total_moved(), "file").green().bold(),
            width = width
        );

        if report.total_skipped() + report.total_failed() > 0 {
            println!(
                "{:<width$} | {} skipped, {} failed",
                "",
                report.total_skipped().to_string().yellow(),
                report.total_failed().to_string().red(),
                width = width
            );
        }

        let skipped: Vec<&(PathBuf, String)> = report
            .batches
            .iter()
            .flat_map(|b| b.result.skipped.iter())
            .collect();
        let failed: Vec<&(PathBuf, String)> = report
            .batches
            .iter()
            .flat_map(|b| b.result.failed.iter())
            .collect();
        Self::problems("Skipped", &skipped);
        Self::problems("Failed", &failed);
    }

    pub fn rollback_report(report: &RollbackReport) {
        if !report.reversed.is_empty() {
            Self::success(&format!(
                "Rolled back {}: {} restored",
                join_ids(&report.reversed),
                plural(report.restored.len(), "file")
            ));
        } else if !report.restored.is_empty() {
            Self::success(&format!(
                "{} restored",
                plural(report.restored.len(), "file")
            ));
        }
        if !report.outstanding.is_empty() {
            Self::warning(&format!(
                "{} not fully rolled back; free the locations below and run rollback again",
                join_ids(&report.outstanding)
            ));
        }

        let skipped: Vec<&(PathBuf, String)> = report.skipped.iter().collect();
        let failed: Vec<&(PathBuf, String)> = report.failed.iter().collect();
        Self::problems("Skipped", &skipped);
        Self::problems("Failed", &failed);
    }

    /// Prints history entries, newest first.
    pub fn history_table(entries: &[&TimelineEntry], rolled_back: &HashSet<TimelineId>) {
        if entries.is_empty() {
            Self::info("No history yet.");
            return;
        }

        Self::header("HISTORY");
        for entry in entries {
            let id = format!("{:<6}", entry.id.to_string());
            let kind = format!("{:<16}", entry.kind.as_str());
            let kind = match entry.kind {
                OperationKind::ConfigChange => kind.yellow(),
                OperationKind::Rollback => kind.magenta(),
                _ => kind.green(),
            };
            let marker = if rolled_back.contains(&entry.id) {
                " (rolled back)".dimmed().to_string()
            } else {
                String::new()
            };
            println!(
                "{} {} {} {}{}",
                id.bold(),
                entry.formatted_time().dimmed(),
                kind,
                entry.description,
                marker
            );
        }
    }

    /// Prints a key/value line, used by `status`.
    pub fn field(label: &str, value: &str) {
        println!("  {:<18} {}", format!("{}:", label).bold(), value);
    }

    fn problems(title: &str, items: &[&(PathBuf, String)]) {
        if items.is_empty() {
            return;
        }
        Self::warning(&format!("{} {}:", title, plural(items.len(), "file")));
        for (path, reason) in items {
            Self::plain(&format!("  - {}: {}", path.display(), reason));
        }
    }
}

fn join_ids(ids: &[TimelineId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `1 file`, `2 files`.
pub fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural() {
        assert_eq!(plural(0, "file"), "0 files");
        assert_eq!(plural(1, "file"), "1 file");
        assert_eq!(plural(12, "file"), "12 files");
    }
}
