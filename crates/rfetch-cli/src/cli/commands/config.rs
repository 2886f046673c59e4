//! `rfetch config` – show config location and effective values.

use anyhow::Result;
use rfetch_core::config::{self, RfetchConfig};

pub fn run_config(cfg: &RfetchConfig) -> Result<()> {
    println!("# config file: {}", config::config_path()?.display());
    match cfg.policy() {
        Ok(_) => println!("# retry policy: valid"),
        Err(e) => println!("# retry policy: INVALID ({})", e),
    }
    print!("{}", cfg.to_toml()?);
    Ok(())
}
