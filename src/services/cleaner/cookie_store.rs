//! SQLite cookie store access.
//!
//! Deletions for every `column × variant` predicate run inside one
//! transaction. Either all of them commit or the transaction is rolled back
//! and nothing is credited. Counting uses the same predicates OR-ed into a
//! single query, so a dry run reports exactly what a live run would delete.

use super::{CleanContext, CleanerError};
use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::{Connection, OpenFlags, params_from_iter};
use std::sync::PoisonError;
use std::time::Duration;

/// Table and text columns the predicates run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieTable {
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

pub const CHROMIUM_COOKIES: CookieTable = CookieTable {
    table: "cookies",
    columns: &["host_key", "name", "value"],
};

pub const GECKO_COOKIES: CookieTable = CookieTable {
    table: "moz_cookies",
    columns: &["host", "name", "value"],
};

/// Write-ahead log and shared-memory companions of a SQLite store.
pub const SIDECAR_SUFFIXES: &[&str] = &["-wal", "-shm"];

pub fn sidecar_paths(store: &Utf8Path) -> Vec<Utf8PathBuf> {
    SIDECAR_SUFFIXES
        .iter()
        .map(|suffix| Utf8PathBuf::from(format!("{}{}", store, suffix)))
        .collect()
}

/// One `LIKE` predicate: column plus escaped `%variant%` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Predicate {
    column: &'static str,
    pattern: String,
}

impl Predicate {
    fn sql(&self, placeholder: usize) -> String {
        format!("{} LIKE ?{} ESCAPE '\\'", self.column, placeholder)
    }

    fn describe(&self) -> String {
        format!("{} LIKE {}", self.column, self.pattern)
    }
}

fn predicates(table: &CookieTable, variants: &[String]) -> Vec<Predicate> {
    let mut out = Vec::new();
    for &column in table.columns {
        for variant in variants {
            out.push(Predicate {
                column,
                pattern: format!("%{}%", escape_like(variant)),
            });
        }
    }
    out
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Delete every row matching a naming variant, all or nothing.
///
/// A missing store file deletes nothing. In dry-run mode this counts instead.
pub fn clean_store(
    path: &Utf8Path,
    table: &CookieTable,
    ctx: &CleanContext<'_>,
) -> Result<u64, CleanerError> {
    if ctx.dry_run {
        return count_matching(path, table, ctx);
    }
    delete_matching(path, table, ctx)
}

pub fn delete_matching(
    path: &Utf8Path,
    table: &CookieTable,
    ctx: &CleanContext<'_>,
) -> Result<u64, CleanerError> {
    if !path.is_file() || ctx.variants.is_empty() {
        return Ok(0);
    }

    let lock = ctx.locks.lock_for(path);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    settle_sidecars(path, ctx);

    let mut conn = open_with_retry(path, OpenFlags::SQLITE_OPEN_READ_WRITE, ctx)?;
    let preds = predicates(table, ctx.variants);

    let tx = conn.transaction().map_err(|source| CleanerError::Transaction {
        path: path.to_path_buf(),
        pattern: "BEGIN".to_string(),
        source,
    })?;

    let mut deleted = 0u64;
    for pred in &preds {
        if ctx.control.is_cancelled() {
            if let Err(e) = tx.rollback() {
                tracing::error!(path = %path, "Rollback failed: {}", e);
            }
            return Err(CleanerError::Cancelled);
        }

        let sql = format!("DELETE FROM {} WHERE {}", table.table, pred.sql(1));
        match tx.execute(&sql, [&pred.pattern]) {
            Ok(rows) => deleted += rows as u64,
            Err(source) => {
                if let Err(e) = tx.rollback() {
                    tracing::error!(path = %path, "Rollback failed: {}", e);
                }
                tracing::warn!(path = %path, pattern = %pred.describe(), "Cookie deletion rolled back");
                return Err(CleanerError::Transaction {
                    path: path.to_path_buf(),
                    pattern: pred.describe(),
                    source,
                });
            }
        }
    }

    tx.commit().map_err(|source| CleanerError::Transaction {
        path: path.to_path_buf(),
        pattern: "COMMIT".to_string(),
        source,
    })?;

    tracing::info!(path = %path, deleted, "Cookie rows removed");
    Ok(deleted)
}

/// Rows a [`delete_matching`] call would remove. Read-only.
pub fn count_matching(
    path: &Utf8Path,
    table: &CookieTable,
    ctx: &CleanContext<'_>,
) -> Result<u64, CleanerError> {
    if !path.is_file() || ctx.variants.is_empty() {
        return Ok(0);
    }

    let lock = ctx.locks.lock_for(path);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    let conn = open_with_retry(path, OpenFlags::SQLITE_OPEN_READ_ONLY, ctx)?;
    let preds = predicates(table, ctx.variants);

    let clause = preds
        .iter()
        .enumerate()
        .map(|(i, p)| p.sql(i + 1))
        .collect::<Vec<_>>()
        .join(" OR ");
    let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", table.table, clause);

    let count: i64 = conn
        .query_row(&sql, params_from_iter(preds.iter().map(|p| &p.pattern)), |row| row.get(0))
        .map_err(|source| CleanerError::Transaction {
            path: path.to_path_buf(),
            pattern: "COUNT".to_string(),
            source,
        })?;

    Ok(u64::try_from(count).unwrap_or(0))
}

/// Fold a leftover write-ahead log into the store, then remove the stale
/// `-wal` / `-shm` files that make a closed store look locked.
///
/// When the checkpoint cannot complete the sidecars stay: they may still hold
/// committed rows.
fn settle_sidecars(path: &Utf8Path, ctx: &CleanContext<'_>) {
    let present: Vec<Utf8PathBuf> = sidecar_paths(path)
        .into_iter()
        .filter(|sidecar| sidecar.exists())
        .collect();
    if present.is_empty() {
        return;
    }

    match checkpoint(path, ctx.settings.statement_timeout()) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(path = %path, "WAL checkpoint blocked, sidecars left in place");
            return;
        }
        Err(e) => {
            tracing::warn!(path = %path, "WAL checkpoint failed, sidecars left in place: {}", e);
            return;
        }
    }

    // closing the checkpoint connection usually removes them already
    for sidecar in present.iter().filter(|sidecar| sidecar.exists()) {
        match super::file_sweep::remove_with_retry(sidecar, ctx) {
            Ok(()) => tracing::debug!(path = %sidecar, "Removed store sidecar"),
            Err(e) => tracing::warn!("{}", e),
        }
    }
}

/// `PRAGMA wal_checkpoint(TRUNCATE)`; `Ok(false)` when a reader or writer blocked it.
fn checkpoint(path: &Utf8Path, timeout: Duration) -> rusqlite::Result<bool> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(timeout)?;
    let busy: i64 = conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| row.get(0))?;
    conn.close().map_err(|(_, e)| e)?;
    Ok(busy == 0)
}

/// Open the store and run a liveness query, retrying with linear backoff.
fn open_with_retry(
    path: &Utf8Path,
    flags: OpenFlags,
    ctx: &CleanContext<'_>,
) -> Result<Connection, CleanerError> {
    let attempts = ctx.settings.store_retry_attempts.max(1);
    let backoff = Duration::from_millis(ctx.settings.store_retry_backoff_ms);
    let flags = flags | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_open(path, flags, ctx.settings.statement_timeout()) {
            Ok(conn) => return Ok(conn),
            Err(source) => {
                tracing::debug!(path = %path, attempt, "Cookie store not ready: {}", source);
                if attempt >= attempts {
                    return Err(CleanerError::StoreOpen {
                        path: path.to_path_buf(),
                        attempts: attempt,
                        source,
                    });
                }
                if !ctx.control.sleep(backoff * attempt) {
                    return Err(CleanerError::Cancelled);
                }
            }
        }
    }
}

fn try_open(path: &Utf8Path, flags: OpenFlags, timeout: Duration) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(path, flags)?;
    conn.busy_timeout(timeout)?;
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;
    Ok(conn)
}
