//! Torrent identifiers and magnet links.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// SHA-1 info hash identifying a torrent.
///
/// Serialized as 40 lowercase hex characters, the form search indexes use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parses a 40 character hex string, case-insensitive.
    ///
    /// # Errors
    /// - `TorrentError::InvalidInfoHash` - Wrong length or non-hex characters
    pub fn from_hex(value: &str) -> Result<Self, TorrentError> {
        let trimmed = value.trim();
        let mut hash = [0u8; 20];
        hex::decode_to_slice(trimmed, &mut hash).map_err(|e| TorrentError::InvalidInfoHash {
            value: trimmed.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(hash))
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for InfoHash {
    type Err = TorrentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for InfoHash {
    type Error = TorrentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<InfoHash> for String {
    fn from(hash: InfoHash) -> Self {
        hash.to_string()
    }
}

/// Magnet URI with display name and tracker list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
}

impl MagnetLink {
    pub fn new(info_hash: InfoHash) -> Self {
        Self {
            info_hash,
            display_name: None,
            trackers: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Adds trackers, skipping blank entries.
    pub fn with_trackers<I, S>(mut self, trackers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trackers.extend(
            trackers
                .into_iter()
                .map(Into::into)
                .filter(|tracker: &String| !tracker.trim().is_empty()),
        );
        self
    }

    /// Renders `magnet:?xt=urn:btih:<hash>&dn=<name>&tr=<tracker>...`.
    pub fn to_uri(&self) -> String {
        let mut uri = format!("magnet:?xt=urn:btih:{}", self.info_hash);
        if let Some(name) = &self.display_name {
            uri.push_str("&dn=");
            uri.push_str(&urlencoding::encode(name));
        }
        for tracker in &self.trackers {
            uri.push_str("&tr=");
            uri.push_str(&urlencoding::encode(tracker.trim()));
        }
        uri
    }
}

impl fmt::Display for MagnetLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

/// Errors in torrent identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TorrentError {
    #[error("Invalid info hash '{value}': {reason}")]
    InvalidInfoHash { value: String, reason: String },
}
