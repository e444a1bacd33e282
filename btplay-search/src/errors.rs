//! Error types for torrent index search.

use thiserror::Error;

/// Errors that can occur while querying a torrent index.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Query was empty after trimming.
    #[error("Search query is empty")]
    EmptyQuery,

    /// Configured base URL could not be used to build a request.
    #[error("Invalid search URL '{url}': {reason}")]
    InvalidUrl {
        /// The URL that was rejected
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Network communication error occurred during search.
    #[error("Network error: {reason}")]
    NetworkError {
        /// The reason for the network error
        reason: String,
    },

    /// Index answered with a non-success status.
    #[error("Search failed for query '{query}': {reason}")]
    SearchFailed {
        /// The search query that failed
        query: String,
        /// The reason for the failure
        reason: String,
    },

    /// Failed to parse the index response.
    #[error("Parse error: {reason}")]
    ParseError {
        /// The reason for the parse error
        reason: String,
    },
}
