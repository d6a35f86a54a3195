//! HTTP implementation of the sheet store.
//!
//! Talks to a spreadsheet bridge endpoint: `GET /statuses` returns the
//! device status map, `POST /batch` applies queued entries plus the current
//! status cells in one request. Authentication is a bearer token read from
//! the local credentials file.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::inventory::DeviceStatus;
use crate::ledger::LogEntry;

use super::{SheetError, SheetStore};

/// Bearer token for the sheet bridge, stored in a local JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetCredentials {
    /// The bearer token.
    pub token: String,
}

impl SheetCredentials {
    /// Load credentials from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or the token
    /// is empty.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SheetError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            SheetError::Credentials(format!("failed to read {}: {err}", path.display()))
        })?;

        let credentials: Self = serde_json::from_str(&raw).map_err(|err| {
            SheetError::Credentials(format!("invalid JSON in {}: {err}", path.display()))
        })?;

        if credentials.token.is_empty() {
            return Err(SheetError::Credentials(format!(
                "empty token in {}",
                path.display()
            )));
        }

        Ok(credentials)
    }
}

/// Target document within the bridge.
#[derive(Debug, Clone)]
pub struct SheetTarget {
    /// Spreadsheet document name.
    pub spreadsheet: String,
    /// Worksheet (tab) name.
    pub worksheet: String,
}

/// Response body of `GET /statuses`.
#[derive(Debug, Deserialize)]
struct StatusResponse {
    devices: HashMap<String, DeviceStatus>,
}

/// Request body of `POST /batch`.
#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    spreadsheet: &'a str,
    worksheet: &'a str,
    entries: &'a [LogEntry],
    statuses: &'a HashMap<String, DeviceStatus>,
}

/// reqwest-backed sheet store.
#[derive(Debug)]
pub struct HttpSheetStore {
    http: reqwest::Client,
    endpoint: String,
    target: SheetTarget,
}

impl HttpSheetStore {
    /// Create a new store talking to the given bridge endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is empty, the token is not a valid
    /// header value, or the HTTP client cannot be built.
    pub fn new(
        endpoint: &str,
        target: SheetTarget,
        credentials: &SheetCredentials,
        timeout: Duration,
    ) -> Result<Self, SheetError> {
        if endpoint.is_empty() {
            return Err(SheetError::Credentials("endpoint is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        let token_val = HeaderValue::from_str(&format!("Bearer {}", credentials.token))
            .map_err(|_| SheetError::Credentials("invalid token format".to_string()))?;
        headers.insert(AUTHORIZATION, token_val);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            target,
        })
    }

    /// Build a bridge URL for a given path.
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    /// Check an HTTP response, mapping non-success statuses to errors.
    fn check_status(resp: &reqwest::Response) -> Result<(), SheetError> {
        let status = resp.status();
        match SheetError::from_status(
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown"),
        ) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

#[async_trait::async_trait]
impl SheetStore for HttpSheetStore {
    async fn pull_statuses(&self) -> Result<HashMap<String, DeviceStatus>, SheetError> {
        let resp = self
            .http
            .get(self.url("/statuses"))
            .query(&[
                ("spreadsheet", self.target.spreadsheet.as_str()),
                ("worksheet", self.target.worksheet.as_str()),
            ])
            .send()
            .await?;
        Self::check_status(&resp)?;

        let body: StatusResponse = resp.json().await?;
        debug!("Pulled {} device statuses", body.devices.len());
        Ok(body.devices)
    }

    async fn apply(
        &self,
        entries: &[LogEntry],
        statuses: &HashMap<String, DeviceStatus>,
    ) -> Result<(), SheetError> {
        let request = BatchRequest {
            spreadsheet: &self.target.spreadsheet,
            worksheet: &self.target.worksheet,
            entries,
            statuses,
        };

        let resp = self
            .http
            .post(self.url("/batch"))
            .json(&request)
            .send()
            .await?;
        Self::check_status(&resp)?;

        debug!("Applied {} entries to remote sheet", entries.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials() -> SheetCredentials {
        SheetCredentials {
            token: "test-token".to_string(),
        }
    }

    fn test_target() -> SheetTarget {
        SheetTarget {
            spreadsheet: "Chromebook Tracker".to_string(),
            worksheet: "SF16".to_string(),
        }
    }

    #[test]
    fn test_new_store() {
        let store = HttpSheetStore::new(
            "https://sheets.example.org/bridge",
            test_target(),
            &test_credentials(),
            Duration::from_secs(30),
        );
        assert!(store.is_ok());
    }

    #[test]
    fn test_new_store_empty_endpoint() {
        let store = HttpSheetStore::new(
            "",
            test_target(),
            &test_credentials(),
            Duration::from_secs(30),
        );
        assert!(store.is_err());
    }

    #[test]
    fn test_new_store_invalid_token() {
        let credentials = SheetCredentials {
            token: "bad\ntoken".to_string(),
        };
        let store = HttpSheetStore::new(
            "https://sheets.example.org/bridge",
            test_target(),
            &credentials,
            Duration::from_secs(30),
        );
        assert!(store.is_err());
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let store = HttpSheetStore::new(
            "https://sheets.example.org/bridge/",
            test_target(),
            &test_credentials(),
            Duration::from_secs(30),
        )
        .unwrap();

        assert_eq!(
            store.url("/statuses"),
            "https://sheets.example.org/bridge/statuses"
        );
    }

    #[test]
    fn test_credentials_load() {
        let path =
            std::env::temp_dir().join(format!("cbtrack_creds_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"token": "abc123"}"#).unwrap();

        let credentials = SheetCredentials::load(&path).unwrap();
        assert_eq!(credentials.token, "abc123");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_credentials_load_missing() {
        let result = SheetCredentials::load("/nonexistent/api_key.json");
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), SheetError::Credentials(_)));
    }

    #[test]
    fn test_credentials_load_empty_token() {
        let path =
            std::env::temp_dir().join(format!("cbtrack_creds_empty_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"token": ""}"#).unwrap();

        let result = SheetCredentials::load(&path);
        assert!(result.is_err());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_batch_request_serialization() {
        let entries = vec![LogEntry::new("SF16-1", DeviceStatus::Out, "Jane Doe")];
        let mut statuses = HashMap::new();
        statuses.insert("SF16-1".to_string(), DeviceStatus::Out);

        let request = BatchRequest {
            spreadsheet: "Chromebook Tracker",
            worksheet: "SF16",
            entries: &entries,
            statuses: &statuses,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("Chromebook Tracker"));
        assert!(json.contains("SF16-1"));
        assert!(json.contains("\"OUT\""));
    }

    #[test]
    fn test_status_response_deserialization() {
        let json = r#"{"devices": {"SF16-1": "IN", "SF16-2": "OUT"}}"#;
        let response: StatusResponse = serde_json::from_str(json).unwrap();

        assert_eq!(response.devices.len(), 2);
        assert_eq!(response.devices.get("SF16-1"), Some(&DeviceStatus::In));
    }
}
