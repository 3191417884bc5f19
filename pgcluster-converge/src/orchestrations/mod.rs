//! Multi-server orchestrations

pub mod setup;

pub use setup::{preview, run_setup, ConfigChangePolicy, ServerPlan, ServerReport, SetupOptions, SetupReport};
