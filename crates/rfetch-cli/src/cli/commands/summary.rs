//! `rfetch summary` – summarize a saved session log.

use anyhow::Result;
use rfetch_core::telemetry::SessionTelemetry;
use std::path::Path;

use super::report::{print_degradation, print_summary};

pub fn run_summary(path: &Path) -> Result<()> {
    let log = SessionTelemetry::load(path)?;
    println!("session {} ({} event(s))", log.session_id, log.events.len());
    print_summary(&log.summary());
    print_degradation(&log.degradation_info);
    Ok(())
}
