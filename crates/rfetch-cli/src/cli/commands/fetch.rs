//! `rfetch fetch` – fetch URLs through a resilient session.

use anyhow::Result;
use rfetch_core::config::RfetchConfig;
use rfetch_core::transport;

use super::session::{run_targets, Target};
use crate::cli::SessionArgs;

pub async fn run_fetch(cfg: &RfetchConfig, urls: &[String], args: &SessionArgs) -> Result<()> {
    let mut targets = Vec::with_capacity(urls.len());
    for url in urls {
        transport::check_url(url)?;
        targets.push(Target {
            key: url.clone(),
            url: url.clone(),
        });
    }
    run_targets(cfg, targets, args).await
}
