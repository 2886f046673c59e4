pub mod config;
pub mod control;
pub mod degradation;
pub mod identity;
pub mod logging;
pub mod pacing;
pub mod retry;
pub mod session;
pub mod telemetry;
pub mod transport;

