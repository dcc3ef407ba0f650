//! Coloured console summaries

use crate::app::models::{SiteEligibility, SiteSummary, TrendDirection};
use crate::app::pipeline::RunOutput;
use colored::*;
use std::path::PathBuf;

fn direction_label(direction: Option<TrendDirection>) -> ColoredString {
    match direction {
        Some(d @ TrendDirection::IncSig) => d.as_str().bright_green().bold(),
        Some(d @ TrendDirection::DecSig) => d.as_str().bright_red().bold(),
        Some(d) => d.as_str().normal(),
        None => "-".dimmed(),
    }
}

fn format_rate(summary: &SiteSummary) -> String {
    match (summary.rate, summary.ci_low, summary.ci_high) {
        (Some(rate), Some(low), Some(high)) => {
            format!("{:>7.2} [{:>6.2}, {:>6.2}]", rate, low, high)
        }
        _ => format!("{:>24}", "fit failed"),
    }
}

/// One line per eligible site
pub fn print_site_table(summaries: &[SiteSummary]) {
    if summaries.is_empty() {
        return;
    }
    println!(
        "\n  {:<10} {:<16} {:>24}  {:<11} {}",
        "Reserve".bright_cyan(),
        "SET".bright_cyan(),
        "mm/yr [95% CI]".bright_cyan(),
        "vs 0".bright_cyan(),
        "vs SLR".bright_cyan()
    );
    for summary in summaries {
        println!(
            "  {:<10} {:<16} {}  {:<11} {}",
            summary.reserve,
            summary.set_id,
            format_rate(summary),
            direction_label(summary.dir_0),
            direction_label(summary.dir_slr)
        );
    }
}

/// End-of-run summary: counts, failures, warnings and written files
pub fn print_run_summary(output: &RunOutput, written: &[PathBuf]) {
    print_site_table(&output.summaries);

    println!("\n{}", "Processing Summary".bright_green().bold());
    println!(
        "  {} {:.2?}",
        "Time elapsed:".bright_cyan(),
        output.elapsed
    );
    println!(
        "  {} {}",
        "Readings loaded:".bright_cyan(),
        output.n_measurements.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Readings excluded by QA/QC:".bright_cyan(),
        output.exclusions.len().to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Sites analysed:".bright_cyan(),
        output.n_eligible().to_string().bright_white().bold()
    );
    println!(
        "  {} {}",
        "Sites ineligible:".bright_cyan(),
        output.n_ineligible().to_string().bright_white()
    );

    let failed: Vec<&SiteSummary> = output.failed().collect();
    if !failed.is_empty() {
        println!(
            "  {} {}",
            "Failed fits:".bright_red(),
            failed.len().to_string().bright_red().bold()
        );
        for summary in failed {
            println!(
                "    {} {}",
                summary.set_id.bright_red(),
                summary.fit_failure.as_deref().unwrap_or_default()
            );
        }
    }

    if !output.warnings.is_empty() {
        println!(
            "  {} {}",
            "Warnings:".bright_yellow(),
            output.warnings.len().to_string().bright_yellow().bold()
        );
        for warning in &output.warnings {
            println!("    {}", warning.to_string().yellow());
        }
    }

    for path in written {
        println!("  {} {}", "Wrote".bright_cyan(), path.display());
    }
}

/// Eligibility table for the `check` command
pub fn print_eligibility(records: &[SiteEligibility]) {
    println!("\n{}", "Site Eligibility".bright_green().bold());
    println!(
        "  {:<10} {:<16} {:<10} {:<10} {:>6} {:>6}  {}",
        "Reserve".bright_cyan(),
        "SET".bright_cyan(),
        "First".bright_cyan(),
        "Last".bright_cyan(),
        "Years".bright_cyan(),
        "Events".bright_cyan(),
        "Eligible".bright_cyan()
    );
    for record in records {
        let eligible = if record.eligible {
            "yes".bright_green()
        } else {
            "no".bright_red()
        };
        println!(
            "  {:<10} {:<16} {:<10} {:<10} {:>6.2} {:>6}  {}",
            record.reserve,
            record.set_id,
            record.first_sampled.to_string(),
            record.last_sampled.to_string(),
            record.years_sampled,
            record.sample_events,
            eligible
        );
    }
    let n_eligible = records.iter().filter(|r| r.eligible).count();
    println!(
        "  {} of {} sites eligible",
        n_eligible.to_string().bright_white().bold(),
        records.len()
    );
}
