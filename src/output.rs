//! Run summary rendering
//!
//! Discrepancies are already logged as they are found; this module renders the final
//! [`RunSummary`] once the run has ended.

use std::time::Duration;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::diff::DiscrepancyReport;
use crate::orchestrator::RunSummary;

/// Output formatter for the run summary
pub struct Output {
    format: OutputFormat,
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(format: OutputFormat, verbosity: VerbosityLevel) -> Self {
        Self {
            format,
            verbosity,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    pub fn with_colors(mut self, show_colors: bool) -> Self {
        self.show_colors = show_colors;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn render(&self, summary: &RunSummary) -> serde_json::Result<String> {
        match self.format {
            OutputFormat::Human => Ok(self.format_human(summary)),
            OutputFormat::Json => serde_json::to_string_pretty(summary),
            OutputFormat::Summary => Ok(format_one_line(summary)),
        }
    }

    pub fn format_human(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        if self.verbosity == VerbosityLevel::Quiet {
            if !summary.is_clean() {
                output.push_str(&format_one_line(summary));
                output.push('\n');
            }
            return output;
        }

        output.push_str(&format!("Migration Summary ({}):\n", summary.mode));
        output.push_str(&format!(
            "  Inventory: old {} ({} listed), new {} ({} listed)\n",
            summary.old_inventory, summary.old_listed, summary.new_inventory, summary.new_listed
        ));
        output.push_str(&format!("  Common: {}\n", summary.common));
        if summary.ignored > 0 {
            output.push_str(&format!("  Ignored: {}\n", summary.ignored));
        }

        output.push_str(&self.count_line("Only in old:", summary.only_old.len(), "33"));
        output.push_str(&self.count_line("Only in new:", summary.only_new.len(), "33"));

        output.push_str(&format!("  Compared: {}\n", summary.compared));
        output.push_str(&format!(
            "  {} {}\n",
            self.colorize("Identical:", "32"),
            summary.identical
        ));
        output.push_str(&self.count_line(
            "Discrepancies:",
            summary.discrepancies.len(),
            "31",
        ));
        output.push_str(&self.count_line("Problems:", summary.problems.len(), "31"));
        output.push_str(&format!(
            "  Duration: {}\n",
            format_duration(summary.metrics.total_duration)
        ));

        if self.verbosity >= VerbosityLevel::Verbose {
            push_list(&mut output, "Only in old", summary.only_old.iter());
            push_list(&mut output, "Only in new", summary.only_new.iter());
            push_list(&mut output, "Problems", summary.problems.iter());

            if !summary.discrepancies.is_empty() {
                output.push_str("\nDiscrepancies:\n");
                for report in &summary.discrepancies {
                    output.push_str(&format!("  {}\n", format_report(report)));
                }
            }

            output.push_str("\nPerformance Metrics:\n");
            output.push_str(&format!(
                "  Throughput: {:.1} comparisons/sec\n",
                summary.metrics.comparisons_per_second
            ));
            output.push_str(&format!(
                "  Max in flight: {}\n",
                summary.metrics.max_in_flight
            ));
        }

        if self.verbosity == VerbosityLevel::Debug {
            output.push_str(&format!("  Run id: {}\n", summary.run_id));
        }

        output
    }

    fn count_line(&self, label: &str, count: usize, color: &str) -> String {
        if count > 0 {
            format!("  {} {}\n", self.colorize(label, color), count)
        } else {
            format!("  {} {}\n", label, count)
        }
    }
}

fn push_list<T: std::fmt::Display>(output: &mut String, title: &str, items: impl ExactSizeIterator<Item = T>) {
    if items.len() == 0 {
        return;
    }
    output.push_str(&format!("\n{}:\n", title));
    for item in items {
        output.push_str(&format!("  {}\n", item));
    }
}

fn format_report(report: &DiscrepancyReport) -> String {
    format!(
        "{} {} {} ({}): old={} new={}",
        report.accession,
        report.category,
        report.key,
        report.kind,
        report.old.as_deref().unwrap_or("-"),
        report.new.as_deref().unwrap_or("-"),
    )
}

fn format_one_line(summary: &RunSummary) -> String {
    format!(
        "compared={} identical={} discrepancies={} accessions_with_discrepancies={} problems={} only_old={} only_new={} duration={}",
        summary.compared,
        summary.identical,
        summary.discrepancies.len(),
        summary.accessions_with_discrepancies(),
        summary.problems.len(),
        summary.only_old.len(),
        summary.only_new.len(),
        format_duration(summary.metrics.total_duration)
    )
}

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else if total_secs < 3600.0 {
        let mins = (total_secs / 60.0) as u64;
        format!("{}m{:.1}s", mins, total_secs % 60.0)
    } else {
        let hours = (total_secs / 3600.0) as u64;
        let mins = ((total_secs % 3600.0) / 60.0) as u64;
        format!("{}h{}m", hours, mins)
    }
}
