//! `rfetch search` – one search-feed query per keyword.

use anyhow::Result;
use rfetch_core::config::RfetchConfig;
use rfetch_core::transport;

use super::session::{run_targets, Target};
use crate::cli::SessionArgs;

pub async fn run_search(cfg: &RfetchConfig, keywords: &[String], args: &SessionArgs) -> Result<()> {
    let mut targets = Vec::with_capacity(keywords.len());
    for keyword in keywords {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            continue;
        }
        targets.push(Target {
            key: keyword.to_string(),
            url: transport::search_url(&cfg.search_url_template, keyword)?,
        });
    }
    if targets.is_empty() {
        anyhow::bail!("no non-blank keywords given");
    }
    run_targets(cfg, targets, args).await
}
