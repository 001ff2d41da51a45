use crate::models::{BrowserProfile, EngineFamily};
use crate::services::cleaner::cookie_store::SIDECAR_SUFFIXES;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("failed to create backup directory {path}: {source}")]
    CreateDir {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("profile directory does not exist: {0}")]
    NoProfileDir(Utf8PathBuf),
}

/// Copies a profile's critical files into a timestamped directory before cleaning.
///
/// Layout: `<root>/<browser>-<profile>-backup-<unix-ts>/<basename>...`
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: Utf8PathBuf,
}

impl BackupManager {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Files the cleaner may mutate, relative to the profile directory.
    ///
    /// Entries starting with `../` resolve against the data directory instead.
    pub fn critical_files(engine: EngineFamily) -> &'static [&'static str] {
        match engine {
            EngineFamily::Chromium => &[
                "Preferences",
                "Secure Preferences",
                "Cookies",
                "Network/Cookies",
                "Current Session",
                "Web Data",
            ],
            EngineFamily::Gecko => &[
                "prefs.js",
                "cookies.sqlite",
                "webappsstore.sqlite",
                "sessionstore.jsonlz4",
            ],
            EngineFamily::WebKit => &[
                "History.db",
                "LastSession.plist",
                "../Cookies/Cookies.binarycookies",
            ],
        }
    }

    /// Snapshot the profile's critical files.
    ///
    /// Only creating the directory can fail; individual copy failures are logged
    /// and skipped. Returns the backup directory.
    pub fn backup_profile(&self, profile: &BrowserProfile) -> Result<Utf8PathBuf, BackupError> {
        if !profile.profile_dir.is_dir() {
            return Err(BackupError::NoProfileDir(profile.profile_dir.clone()));
        }

        let dir = self.create_unique_dir(profile)?;

        let mut copied = 0usize;
        for rel in Self::critical_files(profile.engine()) {
            let source = match rel.strip_prefix("../") {
                Some(data_rel) => profile.data_dir.join(data_rel),
                None => profile.profile_dir.join(rel),
            };
            if !source.is_file() {
                continue;
            }

            let Some(name) = source.file_name() else {
                continue;
            };
            let target = dir.join(name);
            if target.exists() {
                // Cookies and Network/Cookies share a basename; keep the first.
                tracing::debug!(source = %source, "Backup already holds {}, skipping", name);
                continue;
            }

            match fs::copy(&source, &target) {
                Ok(_) => copied += 1,
                Err(e) => {
                    tracing::warn!(source = %source, "Failed to back up file: {}", e);
                    continue;
                }
            }

            // a store is only restorable together with its uncheckpointed log
            for suffix in SIDECAR_SUFFIXES {
                let sidecar = Utf8PathBuf::from(format!("{}{}", source, suffix));
                if !sidecar.is_file() {
                    continue;
                }
                match fs::copy(&sidecar, dir.join(format!("{}{}", name, suffix))) {
                    Ok(_) => copied += 1,
                    Err(e) => tracing::warn!(source = %sidecar, "Failed to back up file: {}", e),
                }
            }
        }

        tracing::info!(
            profile = %profile.display_name,
            backup = %dir,
            files = copied,
            "Backup created"
        );
        Ok(dir)
    }

    fn create_unique_dir(&self, profile: &BrowserProfile) -> Result<Utf8PathBuf, BackupError> {
        let base = format!(
            "{}-backup-{}",
            sanitize(&format!("{}-{}", profile.browser, profile.profile_name())),
            chrono::Utc::now().timestamp()
        );

        fs::create_dir_all(&self.root).map_err(|source| BackupError::CreateDir {
            path: self.root.clone(),
            source,
        })?;

        let mut candidate = self.root.join(&base);
        let mut suffix = 1u32;
        loop {
            match fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && suffix < 1000 => {
                    candidate = self.root.join(format!("{}-{}", base, suffix));
                    suffix += 1;
                }
                Err(source) => {
                    return Err(BackupError::CreateDir {
                        path: candidate,
                        source,
                    });
                }
            }
        }
    }
}

/// Lower-case, with every run of characters outside `[a-z0-9]` collapsed to `-`.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }

    if out.is_empty() {
        "profile".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BrowserKind;
    use tempfile::TempDir;

    fn chrome_profile(temp: &TempDir) -> BrowserProfile {
        let data = Utf8PathBuf::from_path_buf(temp.path().join("User Data")).unwrap();
        let dir = data.join("Profile 1");
        fs::create_dir_all(dir.join("Network")).unwrap();
        fs::write(dir.join("Preferences"), "{}").unwrap();
        fs::write(dir.join("Cookies"), "legacy").unwrap();
        fs::write(dir.join("Network/Cookies"), "network").unwrap();
        BrowserProfile::new(BrowserKind::Chrome, dir, data, false)
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("chrome-Profile 1"), "chrome-profile-1");
        assert_eq!(sanitize("firefox-abcd1234.default-release"), "firefox-abcd1234-default-release");
        assert_eq!(sanitize("  //  "), "profile");
    }

    #[test]
    fn test_backup_copies_critical_files() {
        let temp = TempDir::new().unwrap();
        let profile = chrome_profile(&temp);
        let root = Utf8PathBuf::from_path_buf(temp.path().join("backups")).unwrap();

        let dir = BackupManager::new(&root).backup_profile(&profile).unwrap();

        let name = dir.file_name().unwrap();
        assert!(name.starts_with("chrome-profile-1-backup-"));
        assert!(dir.join("Preferences").is_file());
        // first Cookies wins the basename
        assert_eq!(fs::read_to_string(dir.join("Cookies")).unwrap(), "legacy");
    }

    #[test]
    fn test_backup_keeps_store_sidecars() {
        let temp = TempDir::new().unwrap();
        let data = Utf8PathBuf::from_path_buf(temp.path().join("Profiles")).unwrap();
        let dir = data.join("x1.default-release");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("cookies.sqlite"), "main").unwrap();
        fs::write(dir.join("cookies.sqlite-wal"), "log").unwrap();
        fs::write(dir.join("cookies.sqlite-shm"), "index").unwrap();
        let profile = BrowserProfile::new(BrowserKind::Firefox, dir, data, true);
        let root = Utf8PathBuf::from_path_buf(temp.path().join("backups")).unwrap();

        let backup = BackupManager::new(&root).backup_profile(&profile).unwrap();

        assert_eq!(fs::read_to_string(backup.join("cookies.sqlite-wal")).unwrap(), "log");
        assert!(backup.join("cookies.sqlite-shm").is_file());
        assert!(!backup.join("prefs.js-wal").exists());
    }

    #[test]
    fn test_same_second_backups_do_not_collide() {
        let temp = TempDir::new().unwrap();
        let profile = chrome_profile(&temp);
        let manager = BackupManager::new(Utf8PathBuf::from_path_buf(temp.path().join("b")).unwrap());

        let first = manager.backup_profile(&profile).unwrap();
        let second = manager.backup_profile(&profile).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_root_is_a_file() {
        let temp = TempDir::new().unwrap();
        let profile = chrome_profile(&temp);
        let root = Utf8PathBuf::from_path_buf(temp.path().join("not-a-dir")).unwrap();
        fs::write(&root, "x").unwrap();

        let err = BackupManager::new(&root).backup_profile(&profile).unwrap_err();
        assert!(matches!(err, BackupError::CreateDir { .. }));
    }
}
