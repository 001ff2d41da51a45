use crate::models::LoggingSettings;
use anyhow::{Context, Result};
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup logging with a daily rotating file and optional console output.
///
/// `RUST_LOG` overrides the level chosen by `settings.debug`. With
/// `settings.json` the file receives one JSON object per event.
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active.
/// Fails if the log directory cannot be created or a global subscriber is
/// already installed.
pub fn setup_logging(settings: &LoggingSettings) -> Result<WorkerGuard> {
    if !settings.dir.exists() {
        fs::create_dir_all(&settings.dir)
            .with_context(|| format!("Failed to create log directory: {}", settings.dir))?;
    }

    let file_appender = rolling::daily(&settings.dir, &settings.prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let level = if settings.debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer: Box<dyn Layer<Registry> + Send + Sync> = if settings.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false) // No ANSI codes in log files
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    let console_layer = settings.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(env_filter)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}, json={}",
        settings.dir,
        settings.prefix,
        settings.debug,
        settings.console,
        settings.json
    );

    Ok(guard)
}

/// Like [`setup_logging`], but a failure is reported on stderr and yields `None`.
///
/// Useful where another component (a test harness, an embedding application)
/// may already own the global subscriber.
pub fn try_setup_logging(settings: &LoggingSettings) -> Option<WorkerGuard> {
    match setup_logging(settings) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Logging not initialized: {:#}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_setup_logging_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let settings = LoggingSettings {
            dir: Utf8PathBuf::from_path_buf(temp_dir.path().join("logs")).unwrap(),
            console: false,
            ..Default::default()
        };

        // Only one subscriber per process; a second install may fail, the directory must exist either way.
        let _guard = try_setup_logging(&settings);
        assert!(settings.dir.exists());
    }
}
