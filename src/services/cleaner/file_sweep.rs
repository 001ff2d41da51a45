//! Name and content matched file removal for storage and cache directories.

use super::{CleanContext, CleanerError};
use crate::models::{CleanResult, TelemetryRisk};
use crate::services::control::RunControl;
use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::time::Duration;

/// LevelDB lock and log files; removed before a live sweep, never counted.
pub const SIDECAR_FILES: &[&str] = &["LOCK", "LOG", "LOG.old"];

/// Cache container files whose removal corrupts the cache.
pub const CACHE_CORE_FILES: &[&str] = &[
    "index",
    "the-real-index",
    "data_0",
    "data_1",
    "data_2",
    "data_3",
    "index.txt",
];

/// Extensions of log-structured files worth opening; extension-less files are sniffed too.
pub const SNIFF_EXTENSIONS: &[&str] = &["log", "ldb", "sst", "json", "txt", "localstorage"];

pub const SNIFF_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    Storage,
    Cache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchReason {
    Name,
    /// A directory between the area root and the file names a tracked origin
    Origin,
    Content(TelemetryRisk),
}

#[derive(Debug, Default)]
pub struct SweepOutcome {
    /// Files removed, or in dry-run the files that would be
    pub matched: Vec<Utf8PathBuf>,
    pub errors: Vec<CleanerError>,
}

impl SweepOutcome {
    pub fn merge(&mut self, other: SweepOutcome) {
        self.matched.extend(other.matched);
        self.errors.extend(other.errors);
    }

    pub fn fold_into(self, result: &mut CleanResult) {
        result.deleted_files.extend(self.matched);
        result
            .errors
            .extend(self.errors.into_iter().map(|e| e.to_string()));
    }
}

/// Walk `area` and remove (or count) every matching file.
///
/// A missing area is an empty outcome. Walk and removal failures are collected
/// per item and never stop the walk.
pub fn sweep(area: &Utf8Path, kind: SweepKind, ctx: &CleanContext<'_>) -> SweepOutcome {
    let mut outcome = SweepOutcome::default();
    if !area.is_dir() || ctx.variants.is_empty() {
        return outcome;
    }

    let (sidecars, files) = collect_files(area, &mut outcome);

    if !ctx.dry_run {
        for sidecar in &sidecars {
            if let Err(e) = remove_with_retry(sidecar, ctx) {
                tracing::debug!(path = %sidecar, "Sidecar left in place: {}", e);
            }
        }
    }

    for path in files {
        if ctx.control.is_cancelled() {
            outcome.errors.push(CleanerError::Cancelled);
            break;
        }

        let Some(reason) = classify(area, &path, kind, ctx) else {
            continue;
        };

        if let MatchReason::Content(risk) = reason {
            tracing::debug!(path = %path, %risk, "Content matched tracked service");
        }

        if ctx.dry_run {
            outcome.matched.push(path);
            continue;
        }

        match remove_with_retry(&path, ctx) {
            Ok(()) => {
                tracing::debug!(path = %path, ?reason, "Removed");
                outcome.matched.push(path);
            }
            Err(e) => {
                tracing::warn!("{}", e);
                outcome.errors.push(e);
            }
        }
    }

    outcome
}

fn collect_files(area: &Utf8Path, outcome: &mut SweepOutcome) -> (Vec<Utf8PathBuf>, Vec<Utf8PathBuf>) {
    let walker = WalkBuilder::new(area)
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .follow_links(false)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();

    let mut sidecars = Vec::new();
    let mut files = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                outcome.errors.push(CleanerError::Walk(e.to_string()));
                continue;
            }
        };

        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let Ok(path) = Utf8PathBuf::from_path_buf(entry.into_path()) else {
            continue;
        };

        let is_sidecar = path
            .file_name()
            .is_some_and(|name| SIDECAR_FILES.contains(&name));
        if is_sidecar {
            sidecars.push(path);
        } else {
            files.push(path);
        }
    }

    (sidecars, files)
}

fn classify(
    area: &Utf8Path,
    path: &Utf8Path,
    kind: SweepKind,
    ctx: &CleanContext<'_>,
) -> Option<MatchReason> {
    let name = path.file_name()?;

    if kind == SweepKind::Cache && CACHE_CORE_FILES.contains(&name) {
        return None;
    }

    if ctx.matches_variant(name) {
        return Some(MatchReason::Name);
    }

    // per-origin storage: storage/default/https+++host/ls/data.sqlite, IndexedDB/https_host_0.indexeddb.leveldb/...
    if kind == SweepKind::Storage && in_tracked_origin(area, path, ctx) {
        return Some(MatchReason::Origin);
    }

    let sniffable = match path.extension() {
        None => true,
        Some(ext) => SNIFF_EXTENSIONS
            .iter()
            .any(|s| s.eq_ignore_ascii_case(ext)),
    };
    if !sniffable {
        return None;
    }

    if kind == SweepKind::Cache {
        let len = fs::metadata(path).map(|m| m.len()).ok()?;
        if len > ctx.settings.cache_sniff_max_bytes {
            return None;
        }
    }

    let head = match read_head(path) {
        Ok(head) => head,
        Err(e) => {
            tracing::debug!(path = %path, "Unreadable, skipped: {}", e);
            return None;
        }
    };

    if !ctx.matches_variant(&head) {
        return None;
    }

    Some(MatchReason::Content(ctx.patterns.highest_risk(&head, path.as_str())))
}

fn in_tracked_origin(area: &Utf8Path, path: &Utf8Path, ctx: &CleanContext<'_>) -> bool {
    let Some(parent) = path.parent() else {
        return false;
    };
    let Ok(relative) = parent.strip_prefix(area) else {
        return false;
    };
    relative
        .components()
        .any(|component| ctx.matches_variant(component.as_str()))
}

fn read_head(path: &Utf8Path) -> io::Result<String> {
    let mut buf = Vec::with_capacity(SNIFF_BYTES);
    File::open(path)?
        .take(SNIFF_BYTES as u64)
        .read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Remove one file, retrying transient failures. An already missing file counts as removed.
pub fn remove_with_retry(path: &Utf8Path, ctx: &CleanContext<'_>) -> Result<(), CleanerError> {
    remove_file_with_retry(
        path,
        ctx.settings.remove_retry_attempts,
        Duration::from_millis(ctx.settings.remove_retry_delay_ms),
        ctx.control,
    )
}

pub fn remove_file_with_retry(
    path: &Utf8Path,
    attempts: u32,
    delay: Duration,
    control: &RunControl,
) -> Result<(), CleanerError> {
    let attempts = attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match fs::remove_file(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                if attempt >= attempts || !control.sleep(delay) {
                    return Err(CleanerError::Remove {
                        path: path.to_path_buf(),
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CleanerSettings;
    use crate::services::cleaner::StoreLocks;
    use crate::services::patterns::PatternEngine;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        root: Utf8PathBuf,
        settings: CleanerSettings,
        variants: Vec<String>,
        patterns: PatternEngine,
        locks: StoreLocks,
        control: RunControl,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
            Self {
                _temp: temp,
                root,
                settings: CleanerSettings {
                    remove_retry_delay_ms: 1,
                    cache_sniff_max_bytes: 64,
                    ..Default::default()
                },
                variants: vec!["beacon".to_string()],
                patterns: PatternEngine::default(),
                locks: StoreLocks::default(),
                control: RunControl::never(),
            }
        }

        fn ctx(&self, dry_run: bool) -> CleanContext<'_> {
            CleanContext {
                settings: &self.settings,
                variants: &self.variants,
                patterns: &self.patterns,
                locks: &self.locks,
                control: &self.control,
                dry_run,
            }
        }

        fn write(&self, rel: &str, content: &str) -> Utf8PathBuf {
            let path = self.root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            path
        }
    }

    #[test]
    fn test_storage_sweep_name_and_content() {
        let fx = Fixture::new();
        let by_name = fx.write("ls/https_beacon.io_0.localstorage", "x");
        let by_content = fx.write("ls/leveldb/000003.log", "key:beaconhq.io/session");
        let unrelated = fx.write("ls/leveldb/000004.log", "nothing here");
        let binary = fx.write("ls/leveldb/blob.bin", "beacon");
        let lock = fx.write("ls/leveldb/LOCK", "");

        let outcome = sweep(&fx.root.join("ls"), SweepKind::Storage, &fx.ctx(false));

        assert_eq!(outcome.matched.len(), 2);
        assert!(outcome.errors.is_empty());
        assert!(!by_name.exists());
        assert!(!by_content.exists());
        assert!(unrelated.exists());
        // not sniffable, name does not match
        assert!(binary.exists());
        assert!(!lock.exists());
    }

    #[test]
    fn test_storage_sweep_matches_origin_directories() {
        let fx = Fixture::new();
        let origin_db = fx.write("default/https+++beaconhq.io/ls/data.sqlite", "SQLite format 3");
        let origin_idb = fx.write("default/https+++beaconhq.io/idb/2918063365.sqlite", "SQLite format 3");
        let other_db = fx.write("default/https+++example.com/ls/data.sqlite", "SQLite format 3");

        let outcome = sweep(&fx.root.join("default"), SweepKind::Storage, &fx.ctx(false));

        assert_eq!(outcome.matched.len(), 2);
        assert!(!origin_db.exists());
        assert!(!origin_idb.exists());
        assert!(other_db.exists());
        // files only
        assert!(fx.root.join("default/https+++beaconhq.io/ls").is_dir());
    }

    #[test]
    fn test_cache_sweep_ignores_directory_names() {
        let fx = Fixture::new();
        let entry = fx.write("cache/beacon-entries/f_000010.bin", "opaque");

        let outcome = sweep(&fx.root.join("cache"), SweepKind::Cache, &fx.ctx(false));

        assert!(outcome.matched.is_empty());
        assert!(entry.exists());
    }

    #[test]
    fn test_area_root_name_is_not_an_origin() {
        let fx = Fixture::new();
        let file = fx.write("beacon-area/data.sqlite", "x");

        let outcome = sweep(&fx.root.join("beacon-area"), SweepKind::Storage, &fx.ctx(false));

        assert!(outcome.matched.is_empty());
        assert!(file.exists());
    }

    #[test]
    fn test_dry_run_counts_without_removing() {
        let fx = Fixture::new();
        let file = fx.write("ls/beacon.json", "{}");
        let lock = fx.write("ls/LOCK", "");

        let outcome = sweep(&fx.root.join("ls"), SweepKind::Storage, &fx.ctx(true));

        assert_eq!(outcome.matched, vec![file.clone()]);
        assert!(file.exists());
        assert!(lock.exists());
    }

    #[test]
    fn test_cache_sweep_keeps_core_files_and_gates_size() {
        let fx = Fixture::new();
        let index = fx.write("cache/index", "beacon");
        let small = fx.write("cache/f_000001", "GET https://beacon.io/");
        let large = fx.write("cache/f_000002", &format!("{}beacon", "x".repeat(100)));

        let outcome = sweep(&fx.root.join("cache"), SweepKind::Cache, &fx.ctx(false));

        assert_eq!(outcome.matched.len(), 1);
        assert!(index.exists());
        assert!(!small.exists());
        assert!(large.exists());
    }

    #[test]
    fn test_missing_area_is_empty() {
        let fx = Fixture::new();
        let outcome = sweep(&fx.root.join("absent"), SweepKind::Storage, &fx.ctx(false));
        assert!(outcome.matched.is_empty());
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_remove_missing_file_is_ok() {
        let fx = Fixture::new();
        let result = remove_file_with_retry(
            &fx.root.join("gone"),
            3,
            Duration::from_millis(1),
            &fx.control,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_remove_directory_fails_after_retries() {
        let fx = Fixture::new();
        let dir = fx.root.join("a-directory");
        fs::create_dir_all(&dir).unwrap();

        let err = remove_file_with_retry(&dir, 3, Duration::from_millis(1), &fx.control).unwrap_err();
        assert!(matches!(err, CleanerError::Remove { attempts: 3, .. }));
    }
}
