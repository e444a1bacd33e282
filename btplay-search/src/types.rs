//! Data types returned by torrent indexes.

use std::fmt;

use btplay_core::torrent::InfoHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One torrent as listed by the index.
///
/// Only `name` and `infohash` are required. Everything else the index sends
/// is kept in `extra` so a saved record contains the full response entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentListing {
    /// Display name, also used for saved file names
    pub name: String,
    /// Torrent info hash
    pub infohash: InfoHash,
    /// Remaining fields, passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TorrentListing {
    /// Total size in bytes, if the index reported it.
    pub fn size_bytes(&self) -> Option<u64> {
        self.extra.get("size_bytes")?.as_u64()
    }

    /// Seeder count, if the index reported it.
    pub fn seeders(&self) -> Option<u64> {
        self.extra.get("seeders")?.as_u64()
    }

    /// Creation time, if the index reported `created_unix`.
    pub fn created(&self) -> Option<DateTime<Utc>> {
        let seconds = self.extra.get("created_unix")?.as_i64()?;
        DateTime::from_timestamp(seconds, 0)
    }

    /// Format file size in human-readable format.
    pub fn format_size(&self) -> String {
        const GB: u64 = 1024 * 1024 * 1024;
        const MB: u64 = 1024 * 1024;

        match self.size_bytes() {
            None => "?".to_string(),
            Some(size) if size >= GB => format!("{:.1} GB", size as f64 / GB as f64),
            Some(size) if size >= MB => format!("{:.1} MB", size as f64 / MB as f64),
            Some(size) => format!("{:.1} KB", size as f64 / 1024.0),
        }
    }
}

/// Opaque position in a result set, passed back as `after`.
///
/// Indexes send it either as a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SearchCursor(String);

impl SearchCursor {
    /// Creates a cursor from its wire value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Value sent as the `after` parameter.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SearchCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SearchCursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Self(n.to_string()),
            Raw::Text(s) => Self(s),
        })
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    /// Results on this page, in index order
    #[serde(default)]
    pub torrents: Vec<TorrentListing>,
    /// Cursor for the following page, absent on the last page
    #[serde(default)]
    pub next: Option<SearchCursor>,
}

impl SearchPage {
    /// Whether the index offered a following page.
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

/// Parameters of a single page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Free-text query
    pub text: String,
    /// Results per page
    pub size: u32,
    /// Position to continue after, `None` for the first page
    pub after: Option<SearchCursor>,
}

impl SearchQuery {
    /// First page of `text` with `size` results.
    pub fn new(text: impl Into<String>, size: u32) -> Self {
        Self {
            text: text.into(),
            size,
            after: None,
        }
    }

    /// Same query continuing after `cursor`.
    pub fn after(mut self, cursor: Option<SearchCursor>) -> Self {
        self.after = cursor;
        self
    }
}
