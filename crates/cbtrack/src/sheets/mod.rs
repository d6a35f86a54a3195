//! Remote spreadsheet store for cbtrack.
//!
//! The kiosk persists device statuses and audit rows to a shared
//! spreadsheet through a thin bridge API. This module defines the store
//! trait and its error type; [`http`] provides the reqwest-backed
//! implementation.

pub mod http;

use std::collections::HashMap;

use thiserror::Error;

use crate::inventory::DeviceStatus;
use crate::ledger::LogEntry;

pub use http::{HttpSheetStore, SheetCredentials, SheetTarget};

/// Errors reported by a sheet store.
#[derive(Debug, Error)]
pub enum SheetError {
    /// The remote API rejected the request due to rate limiting.
    #[error("sheet API rate limited: {message}")]
    RateLimited {
        /// Description from the remote API.
        message: String,
    },

    /// The remote API returned a non-success status.
    #[error("sheet API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Description from the remote API.
        message: String,
    },

    /// The request could not be sent or the response not read.
    #[error("sheet request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The credentials file is missing or malformed.
    #[error("sheet credentials error: {0}")]
    Credentials(String),
}

impl SheetError {
    /// Map an HTTP status to a store error, if it is one.
    ///
    /// Returns `None` for success statuses. 429 maps to [`Self::RateLimited`]
    /// so callers can start a cooldown instead of retrying immediately.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Option<Self> {
        match status {
            200..=299 => None,
            429 => Some(Self::RateLimited {
                message: message.into(),
            }),
            _ => Some(Self::Api {
                status,
                message: message.into(),
            }),
        }
    }

    /// Check if this error is a rate limit.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// A remote store holding device statuses and the audit log.
///
/// One `apply` call carries both the appended audit rows and the current
/// status cells, so the remote sheet is updated in a single batched write.
#[async_trait::async_trait]
pub trait SheetStore: Send + Sync {
    /// Pull the current device statuses from the remote store.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote store cannot be reached or rejects
    /// the request.
    async fn pull_statuses(&self) -> Result<HashMap<String, DeviceStatus>, SheetError>;

    /// Append entries and write status cells in one batched update.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote store cannot be reached or rejects
    /// the request; [`SheetError::RateLimited`] signals the caller to back
    /// off.
    async fn apply(
        &self,
        entries: &[LogEntry],
        statuses: &HashMap<String, DeviceStatus>,
    ) -> Result<(), SheetError>;
}
