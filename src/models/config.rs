use crate::models::BrowserKind;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration from tracesweep.yaml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tracked_service: TrackedService,

    #[serde(default)]
    pub cleaner: CleanerSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// The application whose artifacts are being located.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedService {
    pub name: String,

    /// Lower-case naming-family substrings (domains, identifiers, storage keys)
    #[serde(default)]
    pub variants: Vec<String>,

    #[serde(default)]
    pub domains: Vec<String>,
}

impl Default for TrackedService {
    fn default() -> Self {
        Self {
            name: "Beacon".to_string(),
            variants: vec![
                "beacon".to_string(),
                "beaconhq".to_string(),
                "beacon-telemetry".to_string(),
                "beacon_telemetry".to_string(),
            ],
            domains: vec!["beaconhq.io".to_string(), "telemetry.beaconhq.io".to_string()],
        }
    }
}

impl TrackedService {
    /// Every distinct lower-cased naming variant, domains included, in declaration order.
    pub fn naming_variants(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for v in self.variants.iter().chain(self.domains.iter()) {
            let v = v.trim().to_ascii_lowercase();
            if !v.is_empty() && !out.contains(&v) {
                out.push(v);
            }
        }
        out
    }
}

/// Whether `text` contains any of the lower-cased `variants` (ASCII case-insensitive).
pub fn contains_variant(variants: &[String], text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    variants.iter().any(|v| lower.contains(v.as_str()))
}

/// Flags and limits handed to the cleaning core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerSettings {
    pub dry_run: bool,
    pub create_backup: bool,
    /// Enforced by the front end before any mutation starts
    pub confirm_required: bool,
    pub target_browser: Option<BrowserKind>,
    pub backup_root: Utf8PathBuf,
    pub process_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub graceful_wait_ms: u64,
    pub store_retry_attempts: u32,
    pub store_retry_backoff_ms: u64,
    pub statement_timeout_secs: u64,
    pub remove_retry_attempts: u32,
    pub remove_retry_delay_ms: u64,
    pub cache_sniff_max_bytes: u64,
    pub max_parallel_browsers: usize,
}

impl Default for CleanerSettings {
    fn default() -> Self {
        Self {
            dry_run: false,
            create_backup: true,
            confirm_required: true,
            target_browser: None,
            backup_root: Utf8PathBuf::from("backups/browser-data"),
            process_timeout_secs: 10,
            poll_interval_ms: 250,
            graceful_wait_ms: 1500,
            store_retry_attempts: 3,
            store_retry_backoff_ms: 200,
            statement_timeout_secs: 5,
            remove_retry_attempts: 3,
            remove_retry_delay_ms: 100,
            cache_sniff_max_bytes: 10 * 1024 * 1024,
            max_parallel_browsers: 1,
        }
    }
}

impl CleanerSettings {
    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn graceful_wait(&self) -> Duration {
        Duration::from_millis(self.graceful_wait_ms)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub dir: Utf8PathBuf,
    pub prefix: String,
    pub debug: bool,
    pub console: bool,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: Utf8PathBuf::from("logs"),
            prefix: "tracesweep".to_string(),
            debug: false,
            console: true,
            json: false,
        }
    }
}
