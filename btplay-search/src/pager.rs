//! Forward and backward paging over a cursor-based index.
//!
//! Indexes only hand out a cursor for the *next* page. The pager remembers
//! the cursor each visited page was fetched with, so going back re-requests
//! the previous page with its original cursor.

use std::sync::Arc;

use crate::errors::SearchError;
use crate::providers::TorrentSearchProvider;
use crate::types::{SearchCursor, SearchPage, SearchQuery};

/// Pages through results for one query.
#[derive(Debug)]
pub struct SearchPager {
    provider: Arc<dyn TorrentSearchProvider>,
    text: String,
    size: u32,
    /// Cursor used for each visited page, oldest first
    visited: Vec<Option<SearchCursor>>,
    current: SearchPage,
}

impl SearchPager {
    /// Fetches the first page of `text`.
    ///
    /// # Errors
    /// - Any `SearchError` from the provider
    pub async fn start(
        provider: Arc<dyn TorrentSearchProvider>,
        text: impl Into<String>,
        size: u32,
    ) -> Result<Self, SearchError> {
        let text = text.into();
        let current = provider.search(&SearchQuery::new(text.clone(), size)).await?;

        Ok(Self {
            provider,
            text,
            size,
            visited: vec![None],
            current,
        })
    }

    /// Page currently shown.
    pub fn current(&self) -> &SearchPage {
        &self.current
    }

    /// One-based number of the current page.
    pub fn page_number(&self) -> usize {
        self.visited.len()
    }

    /// Query text being paged.
    pub fn query(&self) -> &str {
        &self.text
    }

    /// Whether a following page exists.
    pub fn has_next(&self) -> bool {
        self.current.has_next()
    }

    /// Whether a preceding page exists.
    pub fn has_previous(&self) -> bool {
        self.visited.len() > 1
    }

    /// Moves to the following page. Returns false on the last page.
    ///
    /// On error the pager stays on the current page.
    ///
    /// # Errors
    /// - Any `SearchError` from the provider
    pub async fn next_page(&mut self) -> Result<bool, SearchError> {
        let Some(cursor) = self.current.next.clone() else {
            return Ok(false);
        };

        let page = self.fetch(Some(cursor.clone())).await?;
        self.visited.push(Some(cursor));
        self.current = page;
        Ok(true)
    }

    /// Moves back one page. Returns false on the first page.
    ///
    /// On error the pager stays on the current page.
    ///
    /// # Errors
    /// - Any `SearchError` from the provider
    pub async fn previous_page(&mut self) -> Result<bool, SearchError> {
        if !self.has_previous() {
            return Ok(false);
        }

        let cursor = self.visited[self.visited.len() - 2].clone();
        let page = self.fetch(cursor).await?;
        self.visited.pop();
        self.current = page;
        Ok(true)
    }

    async fn fetch(&self, after: Option<SearchCursor>) -> Result<SearchPage, SearchError> {
        let query = SearchQuery::new(self.text.clone(), self.size).after(after);
        self.provider.search(&query).await
    }
}
