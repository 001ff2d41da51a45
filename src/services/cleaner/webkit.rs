use super::{ArtifactCleaner, CleanContext, CleanerError};
use crate::models::{BrowserProfile, EngineFamily};
use camino::Utf8PathBuf;

/// Safari. Its binary cookie container is reported for manual removal, never edited.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebKitCleaner;

impl WebKitCleaner {
    pub fn cookie_container(profile: &BrowserProfile) -> Utf8PathBuf {
        profile
            .data_dir
            .join("Cookies")
            .join("Cookies.binarycookies")
    }
}

impl ArtifactCleaner for WebKitCleaner {
    fn engine(&self) -> EngineFamily {
        EngineFamily::WebKit
    }

    fn clean_cookies(
        &self,
        profile: &BrowserProfile,
        _ctx: &CleanContext<'_>,
    ) -> Result<u64, CleanerError> {
        let container = Self::cookie_container(profile);
        if !container.is_file() {
            return Ok(0);
        }

        Err(CleanerError::UnsupportedFormat {
            browser: profile.browser,
            artifact: container,
        })
    }

    fn storage_areas(&self, profile: &BrowserProfile) -> Vec<Utf8PathBuf> {
        vec![
            profile.profile_dir.join("LocalStorage"),
            profile.profile_dir.join("Databases"),
        ]
    }

    fn cache_areas(&self, profile: &BrowserProfile) -> Vec<Utf8PathBuf> {
        vec![profile.data_dir.join("Caches").join("com.apple.Safari")]
    }
}
