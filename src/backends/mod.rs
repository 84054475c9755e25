//! Backend adapter abstractions and concrete implementations.

pub mod emby;
#[cfg(test)]
pub mod fake;
pub mod plex;

use crate::error::ClientError;
use crate::models::{
    AuthGrant, CatalogBatch, CatalogItem, ImageKind, LibraryHandle, PlaylistEntry,
    PlaylistSummary, ServerSession,
};

/// Server-side ordering for catalog listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemSort {
    /// Server-side shuffle. Not stable across pages.
    Random,
    /// Newest first. Stable under paging while no items are inserted.
    DateCreatedDescending,
}

/// One catalog listing call: restricted to playable video kinds, recursive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRequest {
    pub parent_id: Option<String>,
    pub sort: ItemSort,
    pub start_index: usize,
    pub limit: usize,
}

/// Interface implemented by concrete media backend adapters.
///
/// Adapters are stateless with respect to the feed: they translate one call
/// into one (or a few) HTTP exchanges and return unfiltered server data.
pub trait MediaBackendAdapter: Send + Sync {
    fn authenticate(
        &self,
        server_url: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthGrant, ClientError>;

    fn fetch_libraries(&self, session: &ServerSession) -> Result<Vec<LibraryHandle>, ClientError>;

    fn fetch_items(
        &self,
        session: &ServerSession,
        request: &CatalogRequest,
    ) -> Result<CatalogBatch, ClientError>;

    fn fetch_playlists(&self, session: &ServerSession)
        -> Result<Vec<PlaylistSummary>, ClientError>;

    fn create_playlist(&self, session: &ServerSession, name: &str) -> Result<String, ClientError>;

    /// Playlist members in playlist (append) order.
    fn fetch_playlist_items(
        &self,
        session: &ServerSession,
        playlist_id: &str,
    ) -> Result<Vec<CatalogItem>, ClientError>;

    /// Playlist members together with their entry ids.
    fn fetch_playlist_entries(
        &self,
        session: &ServerSession,
        playlist_id: &str,
    ) -> Result<Vec<PlaylistEntry>, ClientError>;

    fn add_playlist_item(
        &self,
        session: &ServerSession,
        playlist_id: &str,
        item_id: &str,
    ) -> Result<(), ClientError>;

    fn remove_playlist_entry(
        &self,
        session: &ServerSession,
        playlist_id: &str,
        entry_id: &str,
    ) -> Result<(), ClientError>;

    fn stream_url(&self, session: &ServerSession, item: &CatalogItem) -> String;

    /// Artwork URL, or `None` when the item carries no image reference.
    fn image_url(
        &self,
        session: &ServerSession,
        item: &CatalogItem,
        kind: ImageKind,
    ) -> Option<String>;
}
