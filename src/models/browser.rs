use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Browser engine lineage. Determines artifact formats and which cleaning
/// strategy applies to a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineFamily {
    Chromium,
    Gecko,
    WebKit,
}

impl fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chromium => write!(f, "chromium"),
            Self::Gecko => write!(f, "gecko"),
            Self::WebKit => write!(f, "webkit"),
        }
    }
}

/// Supported browser products, in discovery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    Chrome,
    Chromium,
    Edge,
    Brave,
    Opera,
    Vivaldi,
    Firefox,
    LibreWolf,
    Safari,
}

impl BrowserKind {
    pub const ALL: [BrowserKind; 9] = [
        Self::Chrome,
        Self::Chromium,
        Self::Edge,
        Self::Brave,
        Self::Opera,
        Self::Vivaldi,
        Self::Firefox,
        Self::LibreWolf,
        Self::Safari,
    ];

    pub fn engine(self) -> EngineFamily {
        match self {
            Self::Chrome
            | Self::Chromium
            | Self::Edge
            | Self::Brave
            | Self::Opera
            | Self::Vivaldi => EngineFamily::Chromium,
            Self::Firefox | Self::LibreWolf => EngineFamily::Gecko,
            Self::Safari => EngineFamily::WebKit,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Chrome => "Google Chrome",
            Self::Chromium => "Chromium",
            Self::Edge => "Microsoft Edge",
            Self::Brave => "Brave",
            Self::Opera => "Opera",
            Self::Vivaldi => "Vivaldi",
            Self::Firefox => "Firefox",
            Self::LibreWolf => "LibreWolf",
            Self::Safari => "Safari",
        }
    }

    /// Whether the browser keeps several profiles side by side under one data directory.
    pub fn supports_multiple_profiles(self) -> bool {
        !matches!(self, Self::Opera | Self::Safari)
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Chrome => "chrome",
            Self::Chromium => "chromium",
            Self::Edge => "edge",
            Self::Brave => "brave",
            Self::Opera => "opera",
            Self::Vivaldi => "vivaldi",
            Self::Firefox => "firefox",
            Self::LibreWolf => "librewolf",
            Self::Safari => "safari",
        };
        f.write_str(name)
    }
}

impl FromStr for BrowserKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.to_string() == wanted)
            .ok_or_else(|| format!("unknown browser: {}", s))
    }
}

/// One discovered browser profile. Immutable once discovery produces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserProfile {
    pub browser: BrowserKind,
    /// Human readable, e.g. "Google Chrome (Profile 1)"
    pub display_name: String,
    pub profile_dir: Utf8PathBuf,
    /// Parent data directory ("User Data", "Profiles", "~/Library" for Safari)
    pub data_dir: Utf8PathBuf,
    pub is_default: bool,
}

impl BrowserProfile {
    pub fn new(
        browser: BrowserKind,
        profile_dir: Utf8PathBuf,
        data_dir: Utf8PathBuf,
        is_default: bool,
    ) -> Self {
        let display_name = match profile_dir.file_name() {
            Some(name) if browser.supports_multiple_profiles() => {
                format!("{} ({})", browser.display_name(), name)
            }
            _ => browser.display_name().to_string(),
        };

        Self {
            browser,
            display_name,
            profile_dir,
            data_dir,
            is_default,
        }
    }

    pub fn engine(&self) -> EngineFamily {
        self.browser.engine()
    }

    /// Last path component of the profile directory.
    pub fn profile_name(&self) -> &str {
        self.profile_dir.file_name().unwrap_or("profile")
    }
}
