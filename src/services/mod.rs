//! Services module - the detection and removal engine.
//!
//! Everything here is front-end agnostic: configuration arrives as values
//! ([`CleanerSettings`](crate::models::CleanerSettings),
//! [`TrackedService`](crate::models::TrackedService)) and results leave as
//! serializable [`CleanResult`](crate::models::CleanResult)s.
//!
//! # Components
//!
//! - [`ProfileDiscovery`]: finds browser profiles under the per-OS data roots
//! - [`ProcessController`] / [`SystemProcessController`]: process table queries and termination
//! - [`PatternEngine`]: layered telemetry pattern analysis over text
//! - [`BackupManager`]: critical-file snapshot before any mutation
//! - [`ArtifactCleanService`]: cookie, storage and cache removal per engine family
//! - [`Orchestrator`]: sequences the above per profile with failure isolation
//! - [`RunControl`]: cooperative cancellation and deadlines for all loops
//!
//! # Usage Example
//!
//! ```ignore
//! use tracesweep::services::{ArtifactCleanService, Orchestrator, ProfileDiscovery, RunControl, SystemProcessController};
//!
//! let cleaner = ArtifactCleanService::new(config.cleaner.clone(), &config.tracked_service);
//! let processes = SystemProcessController::new(config.cleaner.graceful_wait());
//! let orchestrator = Orchestrator::new(ProfileDiscovery::new(), processes, cleaner);
//!
//! let report = orchestrator.run(&RunControl::never()).await;
//! ```

pub mod backup;
pub mod cleaner;
pub mod control;
pub mod discovery;
pub mod orchestrator;
pub mod patterns;
pub mod process;

pub use backup::{BackupError, BackupManager};
pub use cleaner::{ArtifactCleanService, ArtifactCleaner, CleanerError, StoreLocks};
pub use control::{CancelHandle, RunControl};
pub use discovery::{PlatformRoots, ProfileDiscovery, TargetOs};
pub use orchestrator::{Orchestrator, ProfileSource};
pub use patterns::{PatternEngine, PatternTables};
pub use process::{
    ProcessController, ProcessError, ProcessLifecycle, ProcessLifecycleState,
    SystemProcessController,
};
