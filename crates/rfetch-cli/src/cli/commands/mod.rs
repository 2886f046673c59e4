//! CLI command handlers, one per file.

mod completions;
mod config;
mod fetch;
mod report;
mod search;
mod session;
mod summary;

pub use completions::run_completions;
pub use config::run_config;
pub use fetch::run_fetch;
pub use search::run_search;
pub use summary::run_summary;
