//! Provider implementations for torrent index search.

use async_trait::async_trait;

use crate::errors::SearchError;
use crate::types::{SearchPage, SearchQuery};

pub mod mock;
pub mod torrents_csv;

#[cfg(test)]
pub use mock::MockProvider;
pub use torrents_csv::TorrentsCsvProvider;

/// Trait for torrent index providers.
#[async_trait]
pub trait TorrentSearchProvider: Send + Sync + std::fmt::Debug {
    /// Fetches one page of results.
    ///
    /// # Errors
    /// - `SearchError::NetworkError` - Network connectivity issues
    /// - `SearchError::SearchFailed` - Index rejected the request
    /// - `SearchError::ParseError` - Response was not understood
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SearchError>;
}
