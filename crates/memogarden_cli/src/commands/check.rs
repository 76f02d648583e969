//! Check command implementation.

use super::{Format, StorePaths};
use memogarden_core::{ConsistencyReport, SystemStatus};
use std::error::Error;
use std::fmt::Write as _;

/// Runs the check command.
///
/// Fails when the resulting status is anything but NORMAL, so scripts can
/// gate on the exit code.
pub fn run(stores: &StorePaths, format: Format) -> Result<(), Box<dyn Error>> {
    let garden = stores.open(false)?;
    let report = garden.check_consistency()?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => print!("{}", render(&report)),
    }

    if report.status == SystemStatus::Normal {
        Ok(())
    } else {
        Err(format!("Consistency check left the system {}", report.status).into())
    }
}

/// Renders a report as text.
pub fn render(report: &ConsistencyReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Scanned {} fact(s) and {} entit{}",
        report.facts_scanned,
        report.entities_scanned,
        if report.entities_scanned == 1 { "y" } else { "ies" }
    );
    if report.is_clean() {
        let _ = writeln!(out, "✓ No findings");
    } else {
        let _ = writeln!(out, "✗ {} finding(s):", report.findings.len());
        for finding in &report.findings {
            let _ = writeln!(out, "  - {finding}");
        }
    }
    let _ = writeln!(out, "Status: {}", report.status);
    out
}
