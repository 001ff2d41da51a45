//! Data models for tracesweep.
//!
//! - [`BrowserProfile`], [`BrowserKind`], [`EngineFamily`]: what discovery finds
//! - [`PatternMatch`], [`TelemetryRisk`], [`CombinationRule`]: what the pattern engine reports
//! - [`CleanResult`], [`RunReport`]: what a cleaning run produces (serializable)
//! - [`AppConfig`] and its sections: loaded from `tracesweep.yaml`
//! - [`RunState`]: live progress snapshot kept by [`StateManager`](crate::state::StateManager)

pub mod browser;
pub mod config;
pub mod detection;
pub mod report;
pub mod run_state;

pub use browser::{BrowserKind, BrowserProfile, EngineFamily};
pub use config::{AppConfig, CleanerSettings, LoggingSettings, TrackedService, contains_variant};
pub use detection::{CombinationRule, PatternCategory, PatternMatch, RiskSummary, TelemetryRisk};
pub use report::{CleanResult, RunReport, RunTotals};
pub use run_state::RunState;
