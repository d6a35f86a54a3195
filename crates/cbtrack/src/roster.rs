//! Student roster (validation table) for cbtrack.
//!
//! The roster maps opaque QR payloads to human-readable student names.
//! Payloads are SHA-256 hex digests of the student's full name joined with
//! a fuzz word, so the QR codes themselves never carry a readable identity.
//! The roster is loaded once at startup and treated as read-only while the
//! kiosk runs.

use std::collections::HashMap;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Read-only mapping from QR payload to student identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    entries: HashMap<String, String>,
}

impl Roster {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a roster from a JSON file.
    ///
    /// Missing or malformed files are hard errors: a kiosk without a
    /// roster cannot validate anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let entries: HashMap<String, String> =
            serde_json::from_str(&raw).map_err(|source| Error::FileParse {
                path: path.to_path_buf(),
                source,
            })?;

        for payload in entries.keys() {
            if !is_payload_shaped(payload) {
                warn!("Roster key is not a SHA-256 digest: {payload}");
            }
        }

        debug!("Loaded roster with {} entries", entries.len());
        Ok(Self { entries })
    }

    /// Save the roster to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(path, raw).map_err(|source| Error::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build a roster from a list of name lines.
    ///
    /// Lines are `Last, First` (reordered to `First Last`) or already
    /// `First Last`. Blank lines and lines starting with `#` (class
    /// markers) are skipped. Each name is hashed with the fuzz word to
    /// produce its payload key.
    ///
    /// # Errors
    ///
    /// Returns an error if two names produce the same payload.
    pub fn build<'a, I>(lines: I, fuzz: &str) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut roster = Self::new();
        for line in lines {
            let Some(name) = normalize_name(line) else {
                continue;
            };
            let payload = hash_name(&name, fuzz);
            if roster.entries.contains_key(&payload) {
                return Err(Error::DuplicatePayload { name });
            }
            roster.entries.insert(payload, name);
        }
        Ok(roster)
    }

    /// Merge another roster into this one.
    ///
    /// Later entries win; a payload that maps to a different name in the
    /// incoming roster is overwritten with a warning.
    pub fn merge(&mut self, other: Roster) {
        for (payload, name) in other.entries {
            if let Some(existing) = self.entries.get(&payload) {
                if *existing != name {
                    warn!("Payload collision while merging: '{existing}' replaced by '{name}'");
                }
            }
            self.entries.insert(payload, name);
        }
    }

    /// Look up the student identity for a payload.
    #[must_use]
    pub fn identify(&self, payload: &str) -> Option<&str> {
        self.entries.get(payload).map(String::as_str)
    }

    /// Check if a payload belongs to the roster.
    #[must_use]
    pub fn contains(&self, payload: &str) -> bool {
        self.entries.contains_key(payload)
    }

    /// Number of roster entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(payload, name)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(payload, name)| (payload.as_str(), name.as_str()))
    }
}

/// Compute the QR payload for a student name.
///
/// The name's whitespace-separated parts are joined with the fuzz word and
/// hashed with SHA-256; the payload is the lowercase hex digest.
#[must_use]
pub fn hash_name(name: &str, fuzz: &str) -> String {
    let joined = name.split_whitespace().collect::<Vec<_>>().join(fuzz);
    let digest = Sha256::digest(joined.as_bytes());
    format!("{digest:x}")
}

/// Normalize a roster input line.
///
/// Returns `None` for blank lines and `#` comment/class-marker lines.
/// `Last, First` entries are reordered to `First Last`.
#[must_use]
pub fn normalize_name(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let name = if let Some((last, first)) = trimmed.split_once(',') {
        format!("{} {}", first.trim(), last.trim())
    } else {
        trimmed.to_string()
    };

    Some(name.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Check whether a payload looks like a SHA-256 hex digest.
#[must_use]
pub fn is_payload_shaped(payload: &str) -> bool {
    payload.len() == 64
        && payload
            .chars()
            .all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_name_is_stable() {
        let first = hash_name("Jane Doe", "paws");
        let second = hash_name("Jane Doe", "paws");
        assert_eq!(first, second);
        assert!(is_payload_shaped(&first));
    }

    #[test]
    fn test_hash_name_joins_with_fuzz() {
        // "Jane Doe" with fuzz "paws" hashes "JanepawsDoe", so a different
        // fuzz must give a different payload.
        assert_ne!(hash_name("Jane Doe", "paws"), hash_name("Jane Doe", "claw"));
    }

    #[test]
    fn test_hash_name_ignores_extra_whitespace() {
        assert_eq!(hash_name("Jane  Doe", "paws"), hash_name("Jane Doe", "paws"));
    }

    #[test]
    fn test_normalize_name_reorders() {
        assert_eq!(normalize_name("Doe, Jane"), Some("Jane Doe".to_string()));
    }

    #[test]
    fn test_normalize_name_passthrough() {
        assert_eq!(normalize_name("Jane Doe"), Some("Jane Doe".to_string()));
    }

    #[test]
    fn test_normalize_name_skips_comments_and_blanks() {
        assert_eq!(normalize_name("# period 3"), None);
        assert_eq!(normalize_name("   "), None);
        assert_eq!(normalize_name(""), None);
    }

    #[test]
    fn test_normalize_name_collapses_whitespace() {
        assert_eq!(
            normalize_name("  Doe ,   Jane  "),
            Some("Jane Doe".to_string())
        );
    }

    #[test]
    fn test_build_roster() {
        let lines = ["# period 3", "Doe, Jane", "", "Smith, Alex"];
        let roster = Roster::build(lines, "paws").unwrap();

        assert_eq!(roster.len(), 2);
        let payload = hash_name("Jane Doe", "paws");
        assert_eq!(roster.identify(&payload), Some("Jane Doe"));
    }

    #[test]
    fn test_build_rejects_duplicates() {
        let lines = ["Doe, Jane", "Jane Doe"];
        let result = Roster::build(lines, "paws");

        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            Error::DuplicatePayload { name } if name == "Jane Doe"
        ));
    }

    #[test]
    fn test_identify_unknown_payload() {
        let roster = Roster::build(["Doe, Jane"], "paws").unwrap();
        assert_eq!(roster.identify("0000"), None);
        assert!(!roster.contains("0000"));
    }

    #[test]
    fn test_merge_adds_entries() {
        let mut roster = Roster::build(["Doe, Jane"], "paws").unwrap();
        let other = Roster::build(["Smith, Alex"], "paws").unwrap();

        roster.merge(other);
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_merge_later_wins() {
        let mut roster = Roster::new();
        roster
            .entries
            .insert("abc".to_string(), "Old Name".to_string());

        let mut other = Roster::new();
        other
            .entries
            .insert("abc".to_string(), "New Name".to_string());

        roster.merge(other);
        assert_eq!(roster.identify("abc"), Some("New Name"));
    }

    #[test]
    fn test_is_payload_shaped() {
        let payload = hash_name("Jane Doe", "paws");
        assert!(is_payload_shaped(&payload));

        assert!(!is_payload_shaped("SF16-3"));
        assert!(!is_payload_shaped(&payload.to_uppercase()));
        assert!(!is_payload_shaped(&payload[..63]));
    }

    #[test]
    fn test_empty_roster() {
        let roster = Roster::new();
        assert!(roster.is_empty());
        assert_eq!(roster.len(), 0);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let path = std::env::temp_dir().join(format!("cbtrack_roster_{}.json", std::process::id()));

        let roster = Roster::build(["Doe, Jane", "Smith, Alex"], "paws").unwrap();
        roster.save(&path).unwrap();

        let loaded = Roster::load(&path).unwrap();
        assert_eq!(roster, loaded);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Roster::load("/nonexistent/validation.json");
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), Error::FileRead { .. }));
    }

    #[test]
    fn test_load_invalid_json() {
        let path = std::env::temp_dir().join(format!("cbtrack_roster_bad_{}.json", std::process::id()));
        std::fs::write(&path, "not json").unwrap();

        let result = Roster::load(&path);
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), Error::FileParse { .. }));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_iter() {
        let roster = Roster::build(["Doe, Jane"], "paws").unwrap();
        let pairs: Vec<_> = roster.iter().collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].1, "Jane Doe");
    }
}
