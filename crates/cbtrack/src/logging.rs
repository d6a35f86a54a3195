//! Logging configuration for cbtrack.
//!
//! This module provides initialization and configuration for the tracing-based
//! logging system, plus the crash-log writer used for fatal errors.

use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Suppress all output except errors.
    Quiet,
    /// Normal output level (info and above).
    #[default]
    Normal,
    /// Verbose output (debug and above).
    Verbose,
    /// Very verbose output (trace level).
    Trace,
}

impl Verbosity {
    /// Convert verbosity to tracing level filter.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

/// Initialize the logging system.
///
/// This should be called once at application startup. The logging level can be
/// controlled via:
/// 1. The `verbosity` parameter
/// 2. The `RUST_LOG` environment variable (takes precedence)
pub fn init_logging(verbosity: Verbosity) {
    // Build the default filter based on verbosity
    let default_filter = format!("cbtrack={}", verbosity.to_level_filter());

    // Allow RUST_LOG to override
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    // Configure the subscriber
    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    );

    // Install the subscriber (ignore error if already set)
    let _ = subscriber.try_init();
}

/// Write a fatal error to a timestamped crash-log file.
///
/// Creates `log_dir` if needed and writes the full error chain to
/// `<log_dir>/<timestamp>_log.txt`. Used by the binary right before a
/// non-zero exit so the operator has something to look at later.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn write_crash_log(log_dir: &Path, err: &crate::Error) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;

    let stamp = chrono::Local::now().format("%Y-%m-%d_%H%M%S");
    let path = log_dir.join(format!("{stamp}_log.txt"));

    let mut report = format!("{err}\n");
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        report.push_str(&format!("caused by: {cause}\n"));
        source = cause.source();
    }

    std::fs::write(&path, report)?;
    Ok(path)
}

/// Initialize logging for tests.
///
/// This sets up a minimal logging configuration suitable for tests.
/// It only logs warnings and errors by default to keep test output clean.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_to_level() {
        assert_eq!(Verbosity::Quiet.to_level_filter(), Level::ERROR);
        assert_eq!(Verbosity::Normal.to_level_filter(), Level::INFO);
        assert_eq!(Verbosity::Verbose.to_level_filter(), Level::DEBUG);
        assert_eq!(Verbosity::Trace.to_level_filter(), Level::TRACE);
    }

    #[test]
    fn test_verbosity_default() {
        assert_eq!(Verbosity::default(), Verbosity::Normal);
    }

    #[test]
    fn test_init_logging_does_not_panic() {
        // The subscriber may already be set from a previous test, which is
        // fine. The function handles this by ignoring the error.
        init_logging(Verbosity::Normal);
    }

    #[test]
    fn test_init_logging_with_all_verbosity_levels() {
        init_logging(Verbosity::Quiet);
        init_logging(Verbosity::Normal);
        init_logging(Verbosity::Verbose);
        init_logging(Verbosity::Trace);
    }

    #[test]
    fn test_init_test_logging_does_not_panic() {
        init_test_logging();
    }

    #[test]
    fn test_write_crash_log() {
        let dir = std::env::temp_dir().join(format!("cbtrack_crash_{}", std::process::id()));

        let err = crate::Error::internal("something broke");
        let path = write_crash_log(&dir, &err).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("something broke"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_write_crash_log_includes_source_chain() {
        let dir = std::env::temp_dir().join(format!("cbtrack_crash_chain_{}", std::process::id()));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = crate::Error::FileRead {
            path: PathBuf::from("/data/validation.json"),
            source: io_err,
        };
        let path = write_crash_log(&dir, &err).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("caused by: no such file"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
