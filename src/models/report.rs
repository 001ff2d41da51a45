use crate::models::{BrowserKind, BrowserProfile, EngineFamily};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Outcome of cleaning (or previewing) one profile.
///
/// Built up by the cleaner and finalized by the orchestrator; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanResult {
    pub browser: BrowserKind,
    pub engine: EngineFamily,
    pub display_name: String,
    pub profile_dir: Utf8PathBuf,
    pub backup_path: Option<Utf8PathBuf>,
    pub cookies_deleted: u64,
    pub storage_items_deleted: u64,
    pub cache_items_deleted: u64,
    pub deleted_files: Vec<Utf8PathBuf>,
    pub errors: Vec<String>,
    /// Artifacts that exist but need removing by hand (unsupported formats)
    pub manual_actions: Vec<String>,
    pub dry_run: bool,
    pub skipped: bool,
}

impl CleanResult {
    pub fn for_profile(profile: &BrowserProfile) -> Self {
        Self {
            browser: profile.browser,
            engine: profile.engine(),
            display_name: profile.display_name.clone(),
            profile_dir: profile.profile_dir.clone(),
            backup_path: None,
            cookies_deleted: 0,
            storage_items_deleted: 0,
            cache_items_deleted: 0,
            deleted_files: Vec::new(),
            errors: Vec::new(),
            manual_actions: Vec::new(),
            dry_run: false,
            skipped: false,
        }
    }

    /// A result for a profile that was never touched.
    pub fn skipped(profile: &BrowserProfile, reason: impl Into<String>) -> Self {
        let mut result = Self::for_profile(profile);
        result.skipped = true;
        result.errors.push(reason.into());
        result
    }

    pub fn total_deleted(&self) -> u64 {
        self.cookies_deleted + self.storage_items_deleted + self.cache_items_deleted
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Get a summary string of what was removed
    pub fn summary(&self) -> String {
        if self.skipped {
            return format!("skipped: {}", self.errors.join("; "));
        }

        let verb = if self.dry_run { "would remove" } else { "removed" };
        let mut parts = Vec::new();

        if self.cookies_deleted > 0 {
            parts.push(format!("{} cookies", self.cookies_deleted));
        }
        if self.storage_items_deleted > 0 {
            parts.push(format!("{} storage items", self.storage_items_deleted));
        }
        if self.cache_items_deleted > 0 {
            parts.push(format!("{} cache items", self.cache_items_deleted));
        }

        let mut summary = if parts.is_empty() {
            "Nothing to clean".to_string()
        } else {
            format!("{} {}", verb, parts.join(", "))
        };

        if !self.errors.is_empty() {
            summary.push_str(&format!(" ({} errors)", self.errors.len()));
        }
        summary
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub profiles: usize,
    pub cookies_deleted: u64,
    pub storage_items_deleted: u64,
    pub cache_items_deleted: u64,
    pub errors: usize,
}

/// Aggregate result of one orchestrated run, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub results: Vec<CleanResult>,
    pub totals: RunTotals,
}

impl RunReport {
    pub fn from_results(results: Vec<CleanResult>) -> Self {
        let totals = results.iter().fold(RunTotals::default(), |mut acc, r| {
            acc.profiles += 1;
            acc.cookies_deleted += r.cookies_deleted;
            acc.storage_items_deleted += r.storage_items_deleted;
            acc.cache_items_deleted += r.cache_items_deleted;
            acc.errors += r.errors.len();
            acc
        });
        Self { results, totals }
    }

    pub fn total_deleted(&self) -> u64 {
        self.totals.cookies_deleted
            + self.totals.storage_items_deleted
            + self.totals.cache_items_deleted
    }
}
