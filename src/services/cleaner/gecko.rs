use super::cookie_store::{self, GECKO_COOKIES};
use super::{ArtifactCleaner, CleanContext, CleanerError};
use crate::models::{BrowserProfile, EngineFamily};
use camino::Utf8PathBuf;

/// Firefox and LibreWolf profiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeckoCleaner;

impl ArtifactCleaner for GeckoCleaner {
    fn engine(&self) -> EngineFamily {
        EngineFamily::Gecko
    }

    fn clean_cookies(
        &self,
        profile: &BrowserProfile,
        ctx: &CleanContext<'_>,
    ) -> Result<u64, CleanerError> {
        cookie_store::clean_store(&profile.profile_dir.join("cookies.sqlite"), &GECKO_COOKIES, ctx)
    }

    fn storage_areas(&self, profile: &BrowserProfile) -> Vec<Utf8PathBuf> {
        vec![
            profile.profile_dir.join("storage").join("default"),
            profile.profile_dir.join("sessionstore-backups"),
        ]
    }

    fn cache_areas(&self, profile: &BrowserProfile) -> Vec<Utf8PathBuf> {
        vec![profile.profile_dir.join("cache2")]
    }
}
