//! Shared driver for commands that run a fetch session over a list of targets.

use anyhow::{Context, Result};
use rfetch_core::config::{self, RfetchConfig};
use rfetch_core::control::JobControl;
use rfetch_core::pacing::Pacer;
use rfetch_core::session::FetchSession;
use rfetch_core::telemetry::FetchContext;
use rfetch_core::transport::{fetch_page_async, Page, TransportOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::report::print_report;
use crate::cli::SessionArgs;

/// One logical operation.
pub(crate) struct Target {
    pub key: String,
    pub url: String,
}

/// Apply command-line overrides to the loaded configuration.
pub(crate) fn effective_config(cfg: &RfetchConfig, args: &SessionArgs) -> RfetchConfig {
    let mut cfg = cfg.clone();
    if let Some(n) = args.max_attempts {
        cfg.retry.max_attempts = n;
    }
    if let Some(secs) = args.timeout {
        cfg.request_timeout_secs = secs;
    }
    cfg
}

pub(crate) async fn run_targets(cfg: &RfetchConfig, targets: Vec<Target>, args: &SessionArgs) -> Result<()> {
    let cfg = effective_config(cfg, args);
    let log_dir = match &cfg.telemetry_dir {
        Some(dir) => dir.clone(),
        None => config::default_telemetry_dir()?,
    };
    let mut session = FetchSession::new(&cfg, Some(log_dir.as_path()))?;
    if args.no_pacing {
        session = session.with_pacer(Pacer::disabled());
    }
    if let Some(out) = &args.out {
        std::fs::create_dir_all(out).with_context(|| format!("create output dir: {}", out.display()))?;
    }
    let opts = TransportOptions::from_config(&cfg);

    let control = Arc::new(JobControl::new());
    let ctrl_c = {
        let control = Arc::clone(&control);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("interrupted; finishing session");
                control.cancel_all();
            }
        })
    };

    tracing::info!(session = %session.session_id(), items = targets.len(), "starting fetch session");
    let total = targets.len();
    for (index, target) in targets.iter().enumerate() {
        let cancel = control.register(&target.key);
        let ctx = FetchContext::new(&target.url, &target.key);
        let result = session
            .fetch(&ctx, &cancel, |identity| fetch_page_async(target.url.clone(), identity, opts))
            .await;
        control.unregister(&target.key);

        match result {
            Ok(page) => {
                println!("ok       {}  (HTTP {}, {} bytes)", target.key, page.status, page.body.len());
                if let Some(out) = &args.out {
                    save_page(out, index, &target.key, &page);
                }
            }
            Err(failure) => println!("skipped  {}  ({})", target.key, failure),
        }

        if control.session_token().is_cancelled() {
            let remaining = total - index - 1;
            if remaining > 0 {
                println!("cancelled; {} item(s) not attempted", remaining);
            }
            break;
        }
    }
    ctrl_c.abort();

    print_report(&session.finish());
    Ok(())
}

/// Save a fetched page under `dir`. A write failure is reported and the
/// session moves on to the next item.
fn save_page(dir: &Path, index: usize, key: &str, page: &Page) -> Option<PathBuf> {
    match write_page(dir, index, key, page) {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "saved page");
            Some(path)
        }
        Err(e) => {
            tracing::warn!(key, "could not save page: {:#}", e);
            eprintln!("warning: could not save {}: {:#}", key, e);
            None
        }
    }
}

fn write_page(dir: &Path, index: usize, key: &str, page: &Page) -> Result<PathBuf> {
    let path = dir.join(page_file_name(index, key, &page.body));
    std::fs::write(&path, page.body.as_bytes()).with_context(|| format!("write page: {}", path.display()))?;
    Ok(path)
}

/// `<index>_<sanitized key>.<xml|html>`, safe on any filesystem.
pub(crate) fn page_file_name(index: usize, key: &str, body: &str) -> String {
    let mut stem: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    stem.truncate(80);
    let head = body.trim_start();
    let ext = if head.starts_with("<?xml") || head.starts_with("<rss") {
        "xml"
    } else {
        "html"
    };
    format!("{:03}_{}.{}", index + 1, stem, ext)
}
