//! Catalog listing queries over the active backend adapter.

use log::debug;

use crate::backends::{CatalogRequest, ItemSort, MediaBackendAdapter};
use crate::error::ClientError;
use crate::models::{CatalogBatch, FeedType, ServerSession};

impl ItemSort {
    /// Random feeds ask the server to shuffle; every other feed is newest first.
    pub fn for_feed(feed_type: FeedType) -> Self {
        match feed_type {
            FeedType::Random => Self::Random,
            FeedType::Latest | FeedType::Favorites => Self::DateCreatedDescending,
        }
    }
}

/// Builds over-fetching catalog requests of a fixed raw batch size.
///
/// The batch size is independent of the page size the caller wants after the
/// vertical filter. Batches come back unfiltered with the server's total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogQueryBuilder {
    batch_size: usize,
}

impl CatalogQueryBuilder {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    #[cfg(test)]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn request(&self, library_id: Option<&str>, sort: ItemSort, skip: usize) -> CatalogRequest {
        CatalogRequest {
            parent_id: library_id
                .map(str::trim)
                .filter(|library_id| !library_id.is_empty())
                .map(str::to_string),
            sort,
            start_index: skip,
            limit: self.batch_size,
        }
    }

    /// Lists one raw batch starting at server offset `skip`.
    pub fn list_items(
        &self,
        adapter: &dyn MediaBackendAdapter,
        session: &ServerSession,
        library_id: Option<&str>,
        sort: ItemSort,
        skip: usize,
    ) -> Result<CatalogBatch, ClientError> {
        let request = self.request(library_id, sort, skip);
        let batch = adapter.fetch_items(session, &request)?;
        debug!(
            "CatalogQueryBuilder: library={} sort={:?} skip={} returned {} of {}",
            library_id.unwrap_or("*"),
            sort,
            skip,
            batch.raw_items.len(),
            batch.total_count
        );
        Ok(batch)
    }
}
