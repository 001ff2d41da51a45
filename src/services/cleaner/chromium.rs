use super::cookie_store::{self, CHROMIUM_COOKIES};
use super::{ArtifactCleaner, CleanContext, CleanerError};
use crate::models::{BrowserProfile, EngineFamily};
use camino::{Utf8Path, Utf8PathBuf};

/// Chrome, Chromium, Edge, Brave, Opera and Vivaldi profiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumCleaner;

impl ChromiumCleaner {
    /// `Network/Cookies` on current builds, `Cookies` on older ones.
    pub fn cookie_store_path(profile: &BrowserProfile) -> Utf8PathBuf {
        let network = profile.profile_dir.join("Network").join("Cookies");
        if network.is_file() {
            network
        } else {
            profile.profile_dir.join("Cookies")
        }
    }
}

/// Delete tracked-service rows from a Chromium `cookies` table.
pub fn clean_chromium_cookies(
    store: &Utf8Path,
    ctx: &CleanContext<'_>,
) -> Result<u64, CleanerError> {
    cookie_store::clean_store(store, &CHROMIUM_COOKIES, ctx)
}

impl ArtifactCleaner for ChromiumCleaner {
    fn engine(&self) -> EngineFamily {
        EngineFamily::Chromium
    }

    fn clean_cookies(
        &self,
        profile: &BrowserProfile,
        ctx: &CleanContext<'_>,
    ) -> Result<u64, CleanerError> {
        clean_chromium_cookies(&Self::cookie_store_path(profile), ctx)
    }

    fn storage_areas(&self, profile: &BrowserProfile) -> Vec<Utf8PathBuf> {
        ["Local Storage", "Session Storage", "IndexedDB"]
            .iter()
            .map(|area| profile.profile_dir.join(area))
            .collect()
    }

    fn cache_areas(&self, profile: &BrowserProfile) -> Vec<Utf8PathBuf> {
        vec![
            profile.profile_dir.join("Cache").join("Cache_Data"),
            profile.profile_dir.join("Code Cache"),
            profile.profile_dir.join("GPUCache"),
        ]
    }
}
