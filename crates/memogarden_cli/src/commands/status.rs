//! Status command implementation.

use super::{Format, StorePaths};
use memogarden_core::HealthReport;
use std::error::Error;
use std::fmt::Write as _;

/// Runs the status command.
pub fn run(stores: &StorePaths, format: Format) -> Result<(), Box<dyn Error>> {
    let garden = stores.open(false)?;
    let health = garden.health();
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&health)?),
        Format::Text => print!("{}", render(&health)),
    }
    Ok(())
}

/// Renders a health report as text.
pub fn render(health: &HealthReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Status:   {}", health.status);
    if let Some(reason) = &health.reason {
        let _ = writeln!(out, "Reason:   {reason}");
    }
    let _ = writeln!(out, "Findings: {}", health.findings.len());
    if health.requires_operator_attention {
        let _ = writeln!(out, "Operator attention required; run `memogarden check` for details");
    }
    out
}
