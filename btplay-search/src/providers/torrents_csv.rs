//! torrents-csv search provider.

use async_trait::async_trait;
use url::Url;

use super::TorrentSearchProvider;
use crate::errors::SearchError;
use crate::types::{SearchPage, SearchQuery};

/// Default public torrents-csv instance.
pub const DEFAULT_BASE_URL: &str = "https://torrents-csv.com";

/// Client for the torrents-csv `service/search` endpoint.
///
/// Requests `GET <base>/service/search?q=<query>&size=<n>[&after=<cursor>]`
/// and expects `{"torrents": [...], "next": <cursor>}` back.
#[derive(Debug, Clone)]
pub struct TorrentsCsvProvider {
    client: reqwest::Client,
    base_url: String,
}

impl TorrentsCsvProvider {
    /// Creates a provider for the default public instance.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a provider for a specific instance.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Builds the request URL for `query`.
    ///
    /// # Errors
    /// - `SearchError::InvalidUrl` - Base URL cannot be parsed
    pub fn search_url(&self, query: &SearchQuery) -> Result<Url, SearchError> {
        let invalid = |e: url::ParseError| SearchError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        };

        let mut base = self.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let mut url = Url::parse(&base)
            .and_then(|base| base.join("service/search"))
            .map_err(invalid)?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", query.text.trim())
                .append_pair("size", &query.size.to_string());
            if let Some(cursor) = &query.after {
                pairs.append_pair("after", cursor.as_str());
            }
        }

        Ok(url)
    }

    /// Parses a response body into a page.
    ///
    /// # Errors
    /// - `SearchError::ParseError` - Body is not a valid search page
    pub fn parse_response(body: &str) -> Result<SearchPage, SearchError> {
        serde_json::from_str(body).map_err(|e| SearchError::ParseError {
            reason: format!("torrents-csv JSON parsing failed: {e}"),
        })
    }
}

impl Default for TorrentsCsvProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TorrentSearchProvider for TorrentsCsvProvider {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SearchError> {
        if query.text.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let url = self.search_url(query)?;
        tracing::debug!("Searching torrents-csv: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SearchError::NetworkError {
                reason: format!("torrents-csv request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(SearchError::SearchFailed {
                query: query.text.clone(),
                reason: format!("torrents-csv HTTP {}", response.status()),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SearchError::NetworkError {
                reason: format!("torrents-csv response read failed: {e}"),
            })?;

        let page = Self::parse_response(&body)?;
        tracing::info!(
            "Search '{}' returned {} results",
            query.text,
            page.torrents.len()
        );
        Ok(page)
    }
}
