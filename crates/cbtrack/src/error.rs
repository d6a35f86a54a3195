//! Error types for cbtrack.
//!
//! This module defines all error types used throughout the cbtrack crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

use crate::sheets::SheetError;

/// The main error type for cbtrack operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Data File Errors ===
    /// Failed to read a local data file.
    #[error("failed to read {path}: {source}")]
    FileRead {
        /// Path to the file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a local data file.
    #[error("failed to write {path}: {source}")]
    FileWrite {
        /// Path to the file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A local data file contains invalid JSON.
    #[error("invalid JSON in {path}: {source}")]
    FileParse {
        /// Path to the file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Scan Source Errors ===
    /// A scan source failed to start.
    #[error("failed to start scan source '{name}': {message}")]
    ScanSourceStart {
        /// Name of the scan source.
        name: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    /// A scan source failed to stop.
    #[error("failed to stop scan source '{name}': {message}")]
    ScanSourceStop {
        /// Name of the scan source.
        name: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    // === Roster Errors ===
    /// A generated payload collided with an existing roster entry.
    #[error("duplicate roster payload for '{name}'")]
    DuplicatePayload {
        /// The name whose payload already exists.
        name: String,
    },

    // === Inventory Errors ===
    /// A device id is not present in the inventory.
    #[error("unknown device '{device}'")]
    UnknownDevice {
        /// The device id that was looked up.
        device: String,
    },

    // === Remote Store Errors ===
    /// The remote sheet store reported an error.
    #[error(transparent)]
    Sheet(#[from] SheetError),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for cbtrack operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a scan source start error.
    #[must_use]
    pub fn scan_source_start(name: &'static str, message: impl Into<String>) -> Self {
        Self::ScanSourceStart {
            name,
            message: message.into(),
        }
    }

    /// Create a scan source stop error.
    #[must_use]
    pub fn scan_source_stop(name: &'static str, message: impl Into<String>) -> Self {
        Self::ScanSourceStop {
            name,
            message: message.into(),
        }
    }

    /// Create an unknown device error.
    #[must_use]
    pub fn unknown_device(device: impl Into<String>) -> Self {
        Self::UnknownDevice {
            device: device.into(),
        }
    }

    /// Check if this error is a remote rate limit.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Sheet(SheetError::RateLimited { .. }))
    }
}
