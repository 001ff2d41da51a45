//! Integration tests for per-profile artifact cleaning
//!
//! These tests verify:
//! - A full Chromium profile pass (backup, cookies, storage, cache)
//! - A failed backup leaves the profile untouched
//! - Preview counts equal what a live clean removes
//! - Gecko and WebKit strategies
//! - Rows still in a WAL-mode store's log survive cleaning and backup

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::Connection;
use std::fs;
use tempfile::TempDir;
use tracesweep::models::{BrowserKind, BrowserProfile, CleanerSettings, TrackedService};
use tracesweep::services::{ArtifactCleanService, RunControl};

struct Fixture {
    _temp: TempDir,
    root: Utf8PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        Self { _temp: temp, root }
    }

    fn settings(&self) -> CleanerSettings {
        CleanerSettings {
            backup_root: self.root.join("backups"),
            store_retry_backoff_ms: 1,
            remove_retry_delay_ms: 1,
            ..Default::default()
        }
    }

    fn service(&self) -> ArtifactCleanService {
        ArtifactCleanService::new(self.settings(), &TrackedService::default())
    }

    /// A Chrome `Default` profile with tracked cookies, storage and cache entries.
    fn chrome_profile(&self) -> BrowserProfile {
        let data = self.root.join("User Data");
        let dir = data.join("Default");

        write(&dir.join("Preferences"), "{}");

        let network = dir.join("Network");
        fs::create_dir_all(&network).unwrap();
        let conn = Connection::open(network.join("Cookies")).unwrap();
        conn.execute_batch(
            "CREATE TABLE cookies (host_key TEXT, name TEXT, value TEXT);
             INSERT INTO cookies VALUES ('.beaconhq.io', 'sid', '1');
             INSERT INTO cookies VALUES ('telemetry.beaconhq.io', 'uid', '2');
             INSERT INTO cookies VALUES ('.example.com', 'sid', '3');",
        )
        .unwrap();

        let leveldb = dir.join("Local Storage/leveldb");
        write(&leveldb.join("000003.log"), "_https://beaconhq.io\u{0}\u{1}session");
        write(&leveldb.join("000004.log"), "_https://example.com\u{0}\u{1}theme");
        write(&leveldb.join("MANIFEST-000001"), "leveldb.BytewiseComparator");
        write(&leveldb.join("LOCK"), "");

        let cache = dir.join("Cache/Cache_Data");
        write(&cache.join("f_00000a"), "GET https://telemetry.beaconhq.io/collect");
        write(&cache.join("f_00000b"), "GET https://example.com/style.css");
        write(&cache.join("index"), "beacon");

        BrowserProfile::new(BrowserKind::Chrome, dir, data, true)
    }

    /// A WAL-mode Firefox cookie store whose rows exist only in the
    /// uncheckpointed log, the way a killed browser leaves it.
    fn gecko_wal_profile(&self) -> BrowserProfile {
        let data = self.root.join("Profiles");
        let dir = data.join("wal1.default-release");
        let staging = self.root.join("staging");
        fs::create_dir_all(&dir).unwrap();
        fs::create_dir_all(&staging).unwrap();

        let store = staging.join("cookies.sqlite");
        let conn = Connection::open(&store).unwrap();
        conn.execute_batch(
            "CREATE TABLE moz_cookies (id INTEGER PRIMARY KEY, host TEXT, name TEXT, value TEXT);",
        )
        .unwrap();
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
        conn.execute_batch(
            "INSERT INTO moz_cookies (host, name, value) VALUES ('.beaconhq.io', 'sid', '1');
             INSERT INTO moz_cookies (host, name, value) VALUES ('telemetry.beaconhq.io', 'uid', '2');
             INSERT INTO moz_cookies (host, name, value) VALUES ('.beacon.dev', 'pref', '3');
             INSERT INTO moz_cookies (host, name, value) VALUES ('.example.org', 'beacon_seen', '4');
             INSERT INTO moz_cookies (host, name, value) VALUES ('.example.com', 'sid', '5');",
        )
        .unwrap();

        // copied while the writer is open, so nothing has been checkpointed
        fs::copy(&store, dir.join("cookies.sqlite")).unwrap();
        fs::copy(staging.join("cookies.sqlite-wal"), dir.join("cookies.sqlite-wal")).unwrap();
        drop(conn);

        BrowserProfile::new(BrowserKind::Firefox, dir, data, true)
    }
}

fn write(path: &Utf8Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn moz_cookie_rows(path: &Utf8Path) -> i64 {
    let conn = Connection::open(path).unwrap();
    conn.query_row("SELECT COUNT(*) FROM moz_cookies", [], |r| r.get(0))
        .unwrap()
}

fn cookie_rows(path: &Utf8Path) -> i64 {
    let conn = Connection::open(path).unwrap();
    conn.query_row("SELECT COUNT(*) FROM cookies", [], |r| r.get(0))
        .unwrap()
}

#[test]
fn test_chromium_profile_full_pass() {
    let fx = Fixture::new();
    let profile = fx.chrome_profile();
    let dir = profile.profile_dir.clone();

    let result = fx
        .service()
        .clean_profile(&profile, true, &RunControl::never());

    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert_eq!(result.cookies_deleted, 2);
    assert_eq!(result.storage_items_deleted, 1);
    assert_eq!(result.cache_items_deleted, 1);
    assert_eq!(result.deleted_files.len(), 2);

    assert_eq!(cookie_rows(&dir.join("Network/Cookies")), 1);
    assert!(!dir.join("Local Storage/leveldb/000003.log").exists());
    assert!(dir.join("Local Storage/leveldb/000004.log").exists());
    assert!(dir.join("Local Storage/leveldb/MANIFEST-000001").exists());
    assert!(!dir.join("Local Storage/leveldb/LOCK").exists());
    assert!(!dir.join("Cache/Cache_Data/f_00000a").exists());
    assert!(dir.join("Cache/Cache_Data/f_00000b").exists());
    assert!(dir.join("Cache/Cache_Data/index").exists());

    let backup = result.backup_path.expect("backup path");
    assert!(backup.starts_with(fx.root.join("backups")));
    assert!(backup.file_name().unwrap().starts_with("chrome-default-backup-"));
    assert!(backup.join("Preferences").is_file());
    assert_eq!(cookie_rows(&backup.join("Cookies")), 3);
}

#[test]
fn test_backup_failure_leaves_profile_untouched() {
    let fx = Fixture::new();
    let profile = fx.chrome_profile();
    let dir = profile.profile_dir.clone();

    // a regular file where the backup root should be
    write(&fx.root.join("backups"), "not a directory");

    let result = fx
        .service()
        .clean_profile(&profile, true, &RunControl::never());

    assert_eq!(result.total_deleted(), 0);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("backup failed"));
    assert!(result.backup_path.is_none());
    assert!(result.deleted_files.is_empty());

    assert_eq!(cookie_rows(&dir.join("Network/Cookies")), 3);
    assert!(dir.join("Local Storage/leveldb/000003.log").exists());
    assert!(dir.join("Local Storage/leveldb/LOCK").exists());
    assert!(dir.join("Cache/Cache_Data/f_00000a").exists());
}

#[test]
fn test_preview_matches_live_clean() {
    let fx = Fixture::new();
    let profile = fx.chrome_profile();
    let service = fx.service();

    let preview = service.preview_profile(&profile, &RunControl::never());
    assert!(preview.dry_run);
    assert!(preview.backup_path.is_none());
    assert!(profile.profile_dir.join("Local Storage/leveldb/LOCK").exists());

    let counted = service.count_matches(&profile);
    assert_eq!(counted, 4);
    assert_eq!(preview.total_deleted(), 4);

    let result = service.clean_profile(&profile, false, &RunControl::never());
    assert_eq!(result.total_deleted() as i64, counted);
    assert_eq!(result.deleted_files, preview.deleted_files);

    assert_eq!(service.count_matches(&profile), 0);
}

#[test]
fn test_cancelled_before_storage() {
    let fx = Fixture::new();
    let profile = fx.chrome_profile();

    let (handle, control) = RunControl::new();
    handle.cancel();

    let result = fx.service().clean_profile(&profile, false, &control);

    assert_eq!(result.cookies_deleted, 0);
    assert_eq!(result.storage_items_deleted, 0);
    assert_eq!(result.cache_items_deleted, 0);
    assert_eq!(result.errors, vec!["cleaning cancelled".to_string()]);
    assert_eq!(cookie_rows(&profile.profile_dir.join("Network/Cookies")), 3);
    assert!(profile.profile_dir.join("Local Storage/leveldb/000003.log").exists());
}

#[test]
fn test_gecko_profile() {
    let fx = Fixture::new();
    let data = fx.root.join("Profiles");
    let dir = data.join("ab12.default-release");
    fs::create_dir_all(&dir).unwrap();

    let conn = Connection::open(dir.join("cookies.sqlite")).unwrap();
    conn.execute_batch(
        "CREATE TABLE moz_cookies (id INTEGER PRIMARY KEY, host TEXT, name TEXT, value TEXT);
         INSERT INTO moz_cookies (host, name, value) VALUES ('.beaconhq.io', 'a', '1');
         INSERT INTO moz_cookies (host, name, value) VALUES ('.mozilla.org', 'b', '2');",
    )
    .unwrap();
    drop(conn);

    write(&dir.join("sessionstore-backups/beacon-session.json"), "{}");
    write(&dir.join("sessionstore-backups/recovery.jsonlz4"), "mozLz40");

    let profile = BrowserProfile::new(BrowserKind::Firefox, dir.clone(), data, true);
    let result = fx
        .service()
        .clean_profile(&profile, false, &RunControl::never());

    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert_eq!(result.cookies_deleted, 1);
    assert_eq!(result.storage_items_deleted, 1);
    assert!(dir.join("sessionstore-backups/recovery.jsonlz4").exists());
}

#[test]
fn test_gecko_wal_store_keeps_committed_rows() {
    let fx = Fixture::new();
    let profile = fx.gecko_wal_profile();
    let store = profile.profile_dir.join("cookies.sqlite");
    let service = fx.service();

    let counted = service.count_matches(&profile);
    assert_eq!(counted, 4);

    let result = service.clean_profile(&profile, true, &RunControl::never());

    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert_eq!(result.cookies_deleted as i64, counted);
    assert_eq!(moz_cookie_rows(&store), 1);

    let backup = result.backup_path.expect("backup path");
    assert!(backup.join("cookies.sqlite-wal").is_file());
    assert_eq!(moz_cookie_rows(&backup.join("cookies.sqlite")), 5);
}

#[test]
fn test_webkit_cookie_container_needs_manual_removal() {
    let fx = Fixture::new();
    let library = fx.root.join("Library");
    let dir = library.join("Safari");
    write(&library.join("Cookies/Cookies.binarycookies"), "cook");
    write(&dir.join("LocalStorage/https_beaconhq.io_0.localstorage"), "");
    write(&dir.join("History.db"), "");

    let profile = BrowserProfile::new(BrowserKind::Safari, dir.clone(), library.clone(), true);
    let result = fx
        .service()
        .clean_profile(&profile, true, &RunControl::never());

    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert_eq!(result.cookies_deleted, 0);
    assert_eq!(result.storage_items_deleted, 1);
    assert_eq!(result.manual_actions.len(), 1);
    assert!(result.manual_actions[0].contains("Cookies.binarycookies"));
    assert!(library.join("Cookies/Cookies.binarycookies").exists());

    let backup = result.backup_path.unwrap();
    assert!(backup.join("Cookies.binarycookies").is_file());
    assert!(backup.join("History.db").is_file());
}
