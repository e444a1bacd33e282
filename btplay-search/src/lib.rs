//! btplay search - torrent index lookup
//!
//! Queries a torrents-csv style index and pages through the results with
//! cursor-based next/previous navigation.

#![deny(missing_docs)]
#![deny(clippy::missing_errors_doc)]

pub mod errors;
pub mod pager;
pub mod providers;
pub mod types;

pub use errors::SearchError;
pub use pager::SearchPager;
pub use providers::{TorrentSearchProvider, TorrentsCsvProvider};
pub use types::{SearchCursor, SearchPage, SearchQuery, TorrentListing};

/// Convenience type alias for Results with SearchError.
pub type Result<T> = std::result::Result<T, SearchError>;
