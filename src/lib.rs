// tracesweep - locate and remove tracked-service artifacts from browser profiles
//
// This is the library crate containing the detection and removal engine.
// The binary crate (main.rs) provides the command line entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::RunMetrics;
pub use models::{AppConfig, BrowserKind, BrowserProfile, CleanResult, PatternMatch, RunReport};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
