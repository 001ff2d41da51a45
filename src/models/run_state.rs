use crate::models::CleanResult;
use std::collections::HashSet;

/// Live progress of a cleaning run.
///
/// Wrapped in `Arc<RwLock<RunState>>` by [`crate::state::StateManager`]; read it
/// through [`read()`](crate::state::StateManager::read) and mutate it through
/// [`update()`](crate::state::StateManager::update) so change events are emitted.
#[derive(Clone, Debug, Default)]
pub struct RunState {
    pub is_running: bool,
    pub dry_run: bool,
    pub current_profile: Option<String>,
    pub current_operation: String,

    pub progress: usize,
    pub total_profiles: usize,

    pub cleaned_profiles: HashSet<String>,
    pub failed_profiles: HashSet<String>,
    pub skipped_profiles: HashSet<String>,

    pub total_cookies: u64,
    pub total_storage_items: u64,
    pub total_cache_items: u64,
}

impl RunState {
    /// Returns (cleaned, failed, skipped, total).
    pub fn run_stats(&self) -> (usize, usize, usize, usize) {
        (
            self.cleaned_profiles.len(),
            self.failed_profiles.len(),
            self.skipped_profiles.len(),
            self.total_profiles,
        )
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Fold a finished profile into the running totals.
    pub fn add_result(&mut self, result: &CleanResult) {
        let name = result.display_name.clone();
        if result.skipped {
            self.skipped_profiles.insert(name);
        } else if result.has_errors() {
            self.failed_profiles.insert(name);
        } else {
            self.cleaned_profiles.insert(name);
        }

        self.total_cookies += result.cookies_deleted;
        self.total_storage_items += result.storage_items_deleted;
        self.total_cache_items += result.cache_items_deleted;
        self.progress += 1;
    }

    pub fn total_stats_summary(&self) -> String {
        let total = self.total_cookies + self.total_storage_items + self.total_cache_items;
        if total == 0 {
            return String::new();
        }

        format!(
            "Total: {} cookies, {} storage items, {} cache items",
            self.total_cookies, self.total_storage_items, self.total_cache_items
        )
    }
}
