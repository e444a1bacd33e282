//! Mock provider implementation for testing.

#[cfg(test)]
use std::collections::HashMap;

#[cfg(test)]
use async_trait::async_trait;
#[cfg(test)]
use parking_lot::Mutex;

#[cfg(test)]
use super::TorrentSearchProvider;
#[cfg(test)]
use crate::errors::SearchError;
#[cfg(test)]
use crate::types::{SearchCursor, SearchPage, SearchQuery, TorrentListing};

/// Mock provider serving pages keyed by cursor.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockProvider {
    pages: HashMap<Option<SearchCursor>, SearchPage>,
    requests: Mutex<Vec<SearchQuery>>,
}

#[cfg(test)]
impl MockProvider {
    /// Creates a provider with `page_count` linked pages of `per_page` results.
    ///
    /// Page `n` (from 0) is reached with cursor `"p<n>"`.
    pub fn with_pages(page_count: usize, per_page: usize) -> Self {
        let mut pages = HashMap::new();
        for page in 0..page_count {
            let cursor = (page > 0).then(|| SearchCursor::new(format!("p{page}")));
            let next = (page + 1 < page_count).then(|| SearchCursor::new(format!("p{}", page + 1)));
            let torrents = (0..per_page)
                .map(|i| listing(&format!("Result {page}-{i}"), page * per_page + i))
                .collect();
            pages.insert(cursor, SearchPage { torrents, next });
        }

        Self {
            pages,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queries received so far.
    pub fn requests(&self) -> Vec<SearchQuery> {
        self.requests.lock().clone()
    }
}

#[cfg(test)]
fn listing(name: &str, seed: usize) -> TorrentListing {
    let mut hash = [0u8; 20];
    hash[..8].copy_from_slice(&(seed as u64).to_be_bytes());
    TorrentListing {
        name: name.to_string(),
        infohash: btplay_core::torrent::InfoHash::new(hash),
        extra: serde_json::Map::new(),
    }
}

#[cfg(test)]
#[async_trait]
impl TorrentSearchProvider for MockProvider {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SearchError> {
        self.requests.lock().push(query.clone());
        self.pages
            .get(&query.after)
            .cloned()
            .ok_or_else(|| SearchError::SearchFailed {
                query: query.text.clone(),
                reason: "unknown cursor".to_string(),
            })
    }
}
