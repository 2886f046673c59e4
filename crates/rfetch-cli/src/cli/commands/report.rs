//! Plain-text rendering of session results.

use rfetch_core::session::SessionReport;
use rfetch_core::telemetry::{DegradationInfo, SessionSummary};

pub(crate) fn print_summary(summary: &SessionSummary) {
    println!(
        "attempts: {}  succeeded: {}  failed: {}  retries: {}",
        summary.total_attempts, summary.success_count, summary.failure_count, summary.retry_count
    );
    println!(
        "success rate: {:.0}%  wait: {:.1}s total, {:.1}s average per retry",
        summary.success_rate * 100.0,
        summary.total_wait_seconds,
        summary.average_wait_seconds
    );
}

pub(crate) fn print_degradation(info: &DegradationInfo) {
    if !info.is_degraded {
        return;
    }
    println!(
        "degraded since {}: {}",
        info.degradation_timestamp.as_deref().unwrap_or("?"),
        info.degradation_reason.as_deref().unwrap_or("unknown reason")
    );
}

pub(crate) fn print_report(report: &SessionReport) {
    println!();
    println!("session {}", report.session_id);
    print_summary(&report.summary);
    for item in &report.skipped {
        let kind = item.block_kind.map(|k| k.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "  skipped {} [{}; {}; {} attempt(s)]",
            item.logical_key, item.reason, kind, item.attempts
        );
    }
    for warning in report.warnings() {
        println!("warning: {}", warning);
    }
    match &report.log_path {
        Some(path) => println!("retry log: {}", path.display()),
        None => println!("retry log: not written (see rfetch.log)"),
    }
}
