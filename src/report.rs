//! Output formatting for generation runs.
//!
//! Supports two output formats:
//! - Pretty: colored terminal summary
//! - JSON: structured output for build scripts

use colored::*;
use serde::Serialize;

use crate::merge::{UnresolvedBase, UnresolvedReason};
use crate::pipeline::{FailedFile, RunReport};

/// JSON report structure.
#[derive(Serialize)]
pub struct JsonReport<'a> {
    pub version: &'static str,
    pub complete: bool,
    #[serde(flatten)]
    pub run: &'a RunReport,
}

pub fn to_json(report: &RunReport) -> anyhow::Result<String> {
    let json = JsonReport {
        version: env!("CARGO_PKG_VERSION"),
        complete: report.is_complete(),
        run: report,
    };
    Ok(serde_json::to_string_pretty(&json)?)
}

/// Write a run report in JSON format.
pub fn write_json(report: &RunReport) -> anyhow::Result<()> {
    println!("{}", to_json(report)?);
    Ok(())
}

/// Write a run report in pretty (human-readable) format.
pub fn write_pretty(report: &RunReport) {
    println!();
    print!("  ");
    print!("{}", "rain-rtti".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", "Output:   ".dimmed());
    print!("{}", report.output.display());
    if report.changed {
        println!();
    } else {
        println!(" {}", "(unchanged)".dimmed());
    }
    println!(
        "  {}{} classes, {} enums, {} headers",
        "Records:  ".dimmed(),
        report.classes,
        report.enums,
        report.includes
    );
    if !report.reextracted.is_empty() {
        println!("  {}{}", "Updated:  ".dimmed(), report.reextracted.len());
    }
    println!();

    if !report.missing.is_empty() {
        println!("  {} ({}):", "Missing caches".bold(), report.missing.len());
        for path in &report.missing {
            println!("    {} {}", "WARN ".yellow(), path.display().to_string().blue());
        }
        println!();
    }

    if !report.failed.is_empty() {
        write_failed(&report.failed);
        println!();
    }

    if !report.unresolved.is_empty() {
        write_unresolved(&report.unresolved);
        println!();
    }

    if report.is_complete() {
        println!("  {}", "✓ OK".green());
    } else {
        println!("  {}", "✗ INCOMPLETE".yellow());
    }
    println!();
}

fn write_failed(failed: &[FailedFile]) {
    println!("  {} ({}):", "Failed extractions".bold(), failed.len());
    println!();

    for f in failed {
        println!("    {} {}", "ERROR".red(), f.file.blue());
        println!("            {}", f.reason);
    }
}

fn write_unresolved(unresolved: &[UnresolvedBase]) {
    println!("  {} ({}):", "Unresolved bases".bold(), unresolved.len());
    println!();

    for u in unresolved {
        print!("    {} ", "WARN ".yellow());
        print!("{:<28}", u.class.as_str().blue());
        println!("{}", u.spelling);
        if let UnresolvedReason::Ambiguous(candidates) = &u.reason {
            println!("            {}", format!("ambiguous: {}", candidates.join(", ")).dimmed());
        }
    }
}
