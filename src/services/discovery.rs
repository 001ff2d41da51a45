//! Browser profile discovery.
//!
//! Checks the per-OS conventional data directories of every supported browser
//! and enumerates the profiles inside them. Discovery never mutates anything;
//! a browser whose base directory is missing simply contributes no profiles.
//!
//! # Examples
//!
//! ```ignore
//! use tracesweep::services::ProfileDiscovery;
//!
//! for profile in ProfileDiscovery::new().discover() {
//!     println!("{} -> {}", profile.display_name, profile.profile_dir);
//! }
//! ```

use crate::models::{BrowserKind, BrowserProfile, EngineFamily};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOs {
    Windows,
    MacOs,
    Linux,
}

impl TargetOs {
    /// The OS this binary was built for. Other unixes follow Linux conventions.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }
}

/// User-level directories the browser data paths hang off.
#[derive(Debug, Clone, Default)]
pub struct PlatformRoots {
    pub home: Option<Utf8PathBuf>,
    /// %LOCALAPPDATA% on Windows
    pub local_data: Option<Utf8PathBuf>,
    /// %APPDATA% on Windows
    pub roaming_data: Option<Utf8PathBuf>,
    /// ~/.config on Linux
    pub config: Option<Utf8PathBuf>,
}

impl PlatformRoots {
    pub fn from_env() -> Self {
        fn utf8(path: Option<std::path::PathBuf>) -> Option<Utf8PathBuf> {
            path.and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
        }

        Self {
            home: utf8(dirs::home_dir()),
            local_data: utf8(dirs::data_local_dir()),
            roaming_data: utf8(dirs::data_dir()),
            config: utf8(dirs::config_dir()),
        }
    }

    /// Every root derived from a single home directory, laid out the way `os` would.
    pub fn under_home(os: TargetOs, home: &Utf8Path) -> Self {
        let (local, roaming, config) = match os {
            TargetOs::Windows => (
                home.join("AppData/Local"),
                home.join("AppData/Roaming"),
                home.join("AppData/Roaming"),
            ),
            TargetOs::MacOs => {
                let support = home.join("Library/Application Support");
                (support.clone(), support.clone(), support)
            }
            TargetOs::Linux => (
                home.join(".local/share"),
                home.join(".local/share"),
                home.join(".config"),
            ),
        };

        Self {
            home: Some(home.to_path_buf()),
            local_data: Some(local),
            roaming_data: Some(roaming),
            config: Some(config),
        }
    }
}

/// Enumerates installed browser profiles.
#[derive(Debug, Clone)]
pub struct ProfileDiscovery {
    os: TargetOs,
    roots: PlatformRoots,
    browsers: Vec<BrowserKind>,
}

impl ProfileDiscovery {
    pub fn new() -> Self {
        Self::with_roots(TargetOs::current(), PlatformRoots::from_env())
    }

    pub fn with_roots(os: TargetOs, roots: PlatformRoots) -> Self {
        Self {
            os,
            roots,
            browsers: BrowserKind::ALL.to_vec(),
        }
    }

    /// Restrict discovery to a single browser.
    pub fn only(mut self, browser: BrowserKind) -> Self {
        self.browsers = vec![browser];
        self
    }

    /// Conventional base data directory for `browser` on this OS, whether or not it exists.
    pub fn base_dir(&self, browser: BrowserKind) -> Option<Utf8PathBuf> {
        use BrowserKind::*;

        let roots = &self.roots;
        match self.os {
            TargetOs::Windows => {
                let local = roots.local_data.as_ref();
                let roaming = roots.roaming_data.as_ref();
                match browser {
                    Chrome => local.map(|r| r.join("Google/Chrome/User Data")),
                    Chromium => local.map(|r| r.join("Chromium/User Data")),
                    Edge => local.map(|r| r.join("Microsoft/Edge/User Data")),
                    Brave => local.map(|r| r.join("BraveSoftware/Brave-Browser/User Data")),
                    Vivaldi => local.map(|r| r.join("Vivaldi/User Data")),
                    Opera => roaming.map(|r| r.join("Opera Software/Opera Stable")),
                    Firefox => roaming.map(|r| r.join("Mozilla/Firefox/Profiles")),
                    LibreWolf => roaming.map(|r| r.join("librewolf/Profiles")),
                    Safari => None,
                }
            }
            TargetOs::MacOs => {
                let home = roots.home.as_ref()?;
                let support = home.join("Library/Application Support");
                Some(match browser {
                    Chrome => support.join("Google/Chrome"),
                    Chromium => support.join("Chromium"),
                    Edge => support.join("Microsoft Edge"),
                    Brave => support.join("BraveSoftware/Brave-Browser"),
                    Vivaldi => support.join("Vivaldi"),
                    Opera => support.join("com.operasoftware.Opera"),
                    Firefox => support.join("Firefox/Profiles"),
                    LibreWolf => support.join("librewolf/Profiles"),
                    Safari => home.join("Library/Safari"),
                })
            }
            TargetOs::Linux => {
                let config = roots.config.as_ref();
                let home = roots.home.as_ref();
                match browser {
                    Chrome => config.map(|r| r.join("google-chrome")),
                    Chromium => config.map(|r| r.join("chromium")),
                    Edge => config.map(|r| r.join("microsoft-edge")),
                    Brave => config.map(|r| r.join("BraveSoftware/Brave-Browser")),
                    Vivaldi => config.map(|r| r.join("vivaldi")),
                    Opera => config.map(|r| r.join("opera")),
                    Firefox => home.map(|r| r.join(".mozilla/firefox")),
                    LibreWolf => home.map(|r| r.join(".librewolf")),
                    Safari => None,
                }
            }
        }
    }

    /// Discover every profile of every configured browser.
    ///
    /// Per-browser probing errors are logged and skipped; whatever was found for
    /// the other browsers is still returned.
    pub fn discover(&self) -> Vec<BrowserProfile> {
        let mut profiles = Vec::new();

        for &browser in &self.browsers {
            match self.discover_browser(browser) {
                Ok(found) => {
                    if !found.is_empty() {
                        tracing::info!(%browser, count = found.len(), "Discovered browser profiles");
                    }
                    profiles.extend(found);
                }
                Err(e) => {
                    tracing::warn!(%browser, "Profile discovery failed: {:#}", e);
                }
            }
        }

        profiles
    }

    /// Discover the profiles of a single browser. A missing base directory is `Ok(vec![])`.
    pub fn discover_browser(&self, browser: BrowserKind) -> Result<Vec<BrowserProfile>> {
        let Some(base) = self.base_dir(browser) else {
            return Ok(Vec::new());
        };

        if !base.is_dir() {
            tracing::debug!(%browser, "No data directory at {}", base);
            return Ok(Vec::new());
        }

        match browser.engine() {
            EngineFamily::Chromium if browser.supports_multiple_profiles() => {
                chromium_profiles(browser, &base)
            }
            EngineFamily::Chromium => Ok(vec![BrowserProfile::new(
                browser,
                base.clone(),
                base.parent().map(Utf8Path::to_path_buf).unwrap_or_else(|| base.clone()),
                true,
            )]),
            EngineFamily::Gecko => gecko_profiles(browser, &base),
            EngineFamily::WebKit => {
                let data_dir = base
                    .parent()
                    .map(Utf8Path::to_path_buf)
                    .unwrap_or_else(|| base.clone());
                Ok(vec![BrowserProfile::new(browser, base, data_dir, true)])
            }
        }
    }
}

impl Default for ProfileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

/// `Default` first, then `Profile N` directories in numeric order.
fn chromium_profiles(browser: BrowserKind, user_data: &Utf8Path) -> Result<Vec<BrowserProfile>> {
    let mut profiles = Vec::new();

    let default_dir = user_data.join("Default");
    if default_dir.is_dir() {
        profiles.push(BrowserProfile::new(
            browser,
            default_dir,
            user_data.to_path_buf(),
            true,
        ));
    }

    let mut numbered: Vec<(u32, Utf8PathBuf)> = Vec::new();
    let entries = fs::read_dir(user_data)
        .with_context(|| format!("Failed to list profile directory: {}", user_data))?;

    for entry in entries.flatten() {
        let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
            continue;
        };
        if !path.is_dir() {
            continue;
        }
        let number = path
            .file_name()
            .and_then(|name| name.strip_prefix("Profile "))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(n) = number {
            numbered.push((n, path));
        }
    }

    numbered.sort_by_key(|(n, _)| *n);
    profiles.extend(
        numbered
            .into_iter()
            .map(|(_, dir)| BrowserProfile::new(browser, dir, user_data.to_path_buf(), false)),
    );

    Ok(profiles)
}

fn gecko_profiles(browser: BrowserKind, profiles_dir: &Utf8Path) -> Result<Vec<BrowserProfile>> {
    let ini_defaults = profiles_ini_defaults(profiles_dir);

    let entries = fs::read_dir(profiles_dir)
        .with_context(|| format!("Failed to list profile directory: {}", profiles_dir))?;

    let mut dirs: Vec<Utf8PathBuf> = entries
        .flatten()
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
        .filter(|path| {
            path.is_dir() && (path.join("prefs.js").exists() || path.join("cookies.sqlite").exists())
        })
        .collect();
    dirs.sort();

    Ok(dirs
        .into_iter()
        .map(|dir| {
            let name = dir.file_name().unwrap_or_default();
            let is_default = name.ends_with(".default-release")
                || name.ends_with(".default")
                || ini_defaults.iter().any(|d| d == name);
            BrowserProfile::new(browser, dir.clone(), profiles_dir.to_path_buf(), is_default)
        })
        .collect())
}

/// Directory names of `Default=1` entries in a nearby profiles.ini.
///
/// On Linux the ini sits beside the profile directories, elsewhere one level up.
fn profiles_ini_defaults(profiles_dir: &Utf8Path) -> Vec<String> {
    let candidates = [
        Some(profiles_dir.join("profiles.ini")),
        profiles_dir.parent().map(|p| p.join("profiles.ini")),
    ];

    let Some(content) = candidates
        .into_iter()
        .flatten()
        .find_map(|path| fs::read_to_string(path).ok())
    else {
        return Vec::new();
    };

    let mut defaults = Vec::new();
    let mut path: Option<String> = None;
    let mut is_default = false;

    let mut flush = |path: &mut Option<String>, is_default: &mut bool| {
        if let Some(p) = path.take() {
            if *is_default {
                if let Some(name) = Utf8Path::new(&p.replace('\\', "/")).file_name() {
                    defaults.push(name.to_string());
                }
            }
        }
        *is_default = false;
    };

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            flush(&mut path, &mut is_default);
        } else if let Some(value) = line.strip_prefix("Path=") {
            path = Some(value.to_string());
        } else if line == "Default=1" {
            is_default = true;
        }
    }
    flush(&mut path, &mut is_default);

    defaults
}
