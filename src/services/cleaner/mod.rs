//! Per-engine artifact removal.
//!
//! [`ArtifactCleanService::clean_profile`] backs up a profile (when asked) and
//! then runs the three artifact classes through the profile engine's
//! [`ArtifactCleaner`] strategy:
//!
//! - cookie store: one all-or-nothing transaction ([`cookie_store`])
//! - local/session storage: name and content matched files ([`file_sweep`])
//! - cache: same as storage, size gated, core index files untouched
//!
//! Failures inside one class are recorded on the [`CleanResult`] and never stop
//! the other classes. Only a failed backup short-circuits before any mutation.

pub mod chromium;
pub mod cookie_store;
pub mod file_sweep;
pub mod gecko;
pub mod webkit;

pub use chromium::ChromiumCleaner;
pub use file_sweep::{SweepKind, SweepOutcome};
pub use gecko::GeckoCleaner;
pub use webkit::WebKitCleaner;

use crate::models::{
    BrowserKind, BrowserProfile, CleanResult, CleanerSettings, EngineFamily, TrackedService,
    contains_variant,
};
use crate::services::backup::BackupManager;
use crate::services::control::RunControl;
use crate::services::patterns::PatternEngine;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CleanerError {
    #[error("cookie store {path} unavailable after {attempts} attempts: {source}")]
    StoreOpen {
        path: Utf8PathBuf,
        attempts: u32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cookie deletion in {path} rolled back ({pattern}): {source}")]
    Transaction {
        path: Utf8PathBuf,
        pattern: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to remove {path} after {attempts} attempts: {source}")]
    Remove {
        path: Utf8PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {0}")]
    Walk(String),

    #[error("{browser} {artifact} uses an unsupported format, remove it manually")]
    UnsupportedFormat {
        browser: BrowserKind,
        artifact: Utf8PathBuf,
    },

    #[error("cleaning cancelled")]
    Cancelled,
}

/// One mutex per cookie store path, shared by every worker of a run.
#[derive(Debug, Clone, Default)]
pub struct StoreLocks {
    inner: Arc<Mutex<HashMap<Utf8PathBuf, Arc<Mutex<()>>>>>,
}

impl StoreLocks {
    pub fn lock_for(&self, path: &Utf8Path) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(path.to_path_buf()).or_default().clone()
    }
}

/// Everything a strategy needs for one profile pass.
#[derive(Debug, Clone, Copy)]
pub struct CleanContext<'a> {
    pub settings: &'a CleanerSettings,
    /// Lower-cased tracked-service naming variants
    pub variants: &'a [String],
    pub patterns: &'a PatternEngine,
    pub locks: &'a StoreLocks,
    pub control: &'a RunControl,
    /// Count only; nothing on disk changes
    pub dry_run: bool,
}

impl CleanContext<'_> {
    pub fn matches_variant(&self, text: &str) -> bool {
        contains_variant(self.variants, text)
    }
}

/// Capability set of one engine family.
///
/// In dry-run mode every method counts what it would remove instead of removing it.
pub trait ArtifactCleaner: Send + Sync + fmt::Debug {
    fn engine(&self) -> EngineFamily;

    /// Remove (or count) matching cookie rows.
    fn clean_cookies(
        &self,
        profile: &BrowserProfile,
        ctx: &CleanContext<'_>,
    ) -> Result<u64, CleanerError>;

    fn storage_areas(&self, profile: &BrowserProfile) -> Vec<Utf8PathBuf>;

    fn cache_areas(&self, profile: &BrowserProfile) -> Vec<Utf8PathBuf>;

    fn clean_storage(&self, profile: &BrowserProfile, ctx: &CleanContext<'_>) -> SweepOutcome {
        sweep_areas(&self.storage_areas(profile), SweepKind::Storage, ctx)
    }

    fn clean_cache(&self, profile: &BrowserProfile, ctx: &CleanContext<'_>) -> SweepOutcome {
        sweep_areas(&self.cache_areas(profile), SweepKind::Cache, ctx)
    }
}

fn sweep_areas(areas: &[Utf8PathBuf], kind: SweepKind, ctx: &CleanContext<'_>) -> SweepOutcome {
    let mut outcome = SweepOutcome::default();
    for area in areas {
        outcome.merge(file_sweep::sweep(area, kind, ctx));
    }
    outcome
}

pub fn strategy_for(engine: EngineFamily) -> &'static dyn ArtifactCleaner {
    match engine {
        EngineFamily::Chromium => &ChromiumCleaner,
        EngineFamily::Gecko => &GeckoCleaner,
        EngineFamily::WebKit => &WebKitCleaner,
    }
}

/// Backs up and cleans browser profiles.
///
/// All methods are blocking; async callers run them on `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct ArtifactCleanService {
    settings: CleanerSettings,
    variants: Vec<String>,
    patterns: PatternEngine,
    locks: StoreLocks,
    backup: BackupManager,
}

impl ArtifactCleanService {
    pub fn new(settings: CleanerSettings, service: &TrackedService) -> Self {
        let variants = service.naming_variants();
        Self {
            backup: BackupManager::new(settings.backup_root.clone()),
            patterns: PatternEngine::with_service_variants(&variants),
            locks: StoreLocks::default(),
            variants,
            settings,
        }
    }

    pub fn with_pattern_engine(mut self, patterns: PatternEngine) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn settings(&self) -> &CleanerSettings {
        &self.settings
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    /// Back up (optionally) and clean one profile.
    ///
    /// Never fails as a whole: every problem ends up in the returned result's
    /// `errors` or `manual_actions`. A failed backup returns before anything is
    /// touched.
    pub fn clean_profile(
        &self,
        profile: &BrowserProfile,
        create_backup: bool,
        control: &RunControl,
    ) -> CleanResult {
        let mut result = CleanResult::for_profile(profile);

        if create_backup {
            match self.backup.backup_profile(profile) {
                Ok(path) => result.backup_path = Some(path),
                Err(e) => {
                    tracing::error!(profile = %profile.display_name, "Backup failed, profile left untouched: {}", e);
                    result.errors.push(format!("backup failed: {}", e));
                    return result;
                }
            }
        }

        self.run_classes(profile, control, false, &mut result);
        tracing::info!(profile = %profile.display_name, "{}", result.summary());
        result
    }

    /// Dry-run pass: the same matching as [`clean_profile`](Self::clean_profile), read-only.
    pub fn preview_profile(&self, profile: &BrowserProfile, control: &RunControl) -> CleanResult {
        let mut result = CleanResult::for_profile(profile);
        result.dry_run = true;
        self.run_classes(profile, control, true, &mut result);
        result
    }

    /// Number of artifacts a live clean would remove right now.
    pub fn count_matches(&self, profile: &BrowserProfile) -> i64 {
        let total = self.preview_profile(profile, &RunControl::never()).total_deleted();
        i64::try_from(total).unwrap_or(i64::MAX)
    }

    fn run_classes(
        &self,
        profile: &BrowserProfile,
        control: &RunControl,
        dry_run: bool,
        result: &mut CleanResult,
    ) {
        let strategy = strategy_for(profile.engine());
        let ctx = CleanContext {
            settings: &self.settings,
            variants: &self.variants,
            patterns: &self.patterns,
            locks: &self.locks,
            control,
            dry_run,
        };

        match strategy.clean_cookies(profile, &ctx) {
            Ok(count) => result.cookies_deleted = count,
            // recorded once below
            Err(CleanerError::Cancelled) => {}
            Err(e @ CleanerError::UnsupportedFormat { .. }) => {
                tracing::warn!(profile = %profile.display_name, "{}", e);
                result.manual_actions.push(e.to_string());
            }
            Err(e) => {
                tracing::warn!(profile = %profile.display_name, "Cookie cleaning failed: {}", e);
                result.errors.push(e.to_string());
            }
        }

        if control.is_cancelled() {
            record_cancelled(result);
            return;
        }

        let storage = strategy.clean_storage(profile, &ctx);
        result.storage_items_deleted = storage.matched.len() as u64;
        storage.fold_into(result);

        if control.is_cancelled() {
            record_cancelled(result);
            return;
        }

        let cache = strategy.clean_cache(profile, &ctx);
        result.cache_items_deleted = cache.matched.len() as u64;
        cache.fold_into(result);
    }
}

/// A sweep interrupted by the cancel already carries the error.
fn record_cancelled(result: &mut CleanResult) {
    let message = CleanerError::Cancelled.to_string();
    if !result.errors.contains(&message) {
        result.errors.push(message);
    }
}
