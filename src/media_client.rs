//! Backend-agnostic client capability consumed by the feed coordinator.

use std::collections::HashSet;

use log::info;

use crate::backends::MediaBackendAdapter;
use crate::catalog::CatalogQueryBuilder;
use crate::config::{FeedConfig, ServerType};
use crate::error::ClientError;
use crate::favorites::FavoritesEmulator;
use crate::models::{
    CatalogItem, FeedPage, FeedQuery, ImageKind, LibraryHandle, ServerSession,
};
use crate::pagination::Paginator;

/// Everything the feed needs from an authenticated media server.
pub trait MediaClient: Send + Sync {
    fn session(&self) -> &ServerSession;

    fn get_libraries(&self) -> Result<Vec<LibraryHandle>, ClientError>;

    /// One vertical-filtered page for `query`.
    fn get_vertical_videos(&self, query: &FeedQuery) -> Result<FeedPage, ClientError>;

    /// Favorited item ids in the scope named `library_name`.
    fn get_favorites(&self, library_name: &str) -> Result<HashSet<String>, ClientError>;

    /// Adds the item when it is not currently a favorite, removes it otherwise.
    fn toggle_favorite(
        &self,
        item_id: &str,
        is_currently_favorite: bool,
        library_name: &str,
    ) -> Result<(), ClientError>;

    fn stream_url(&self, item: &CatalogItem) -> String;

    fn image_url(&self, item: &CatalogItem, kind: ImageKind) -> Option<String>;
}

/// [`MediaClient`] over any backend adapter.
pub struct TokClient<A: MediaBackendAdapter> {
    adapter: A,
    session: ServerSession,
    favorites: FavoritesEmulator,
    paginator: Paginator,
    favorites_scope: String,
}

impl<A: MediaBackendAdapter> TokClient<A> {
    pub fn new(adapter: A, session: ServerSession, feed: &FeedConfig) -> Self {
        Self {
            adapter,
            session,
            favorites: FavoritesEmulator::new(),
            paginator: Paginator::new(CatalogQueryBuilder::new(feed.catalog_batch_size)),
            favorites_scope: feed.favorites_scope_name.clone(),
        }
    }

    /// Authenticates through `adapter` and wraps the resulting session.
    pub fn login(
        adapter: A,
        server_type: ServerType,
        server_url: &str,
        username: &str,
        password: &str,
        feed: &FeedConfig,
    ) -> Result<Self, ClientError> {
        let grant = adapter.authenticate(server_url, username, password)?;
        let session = ServerSession::from_grant(server_url, server_type, grant);
        info!(
            "TokClient: signed in to {} as {} ({:?})",
            session.server_url, session.username, server_type
        );
        Ok(Self::new(adapter, session, feed))
    }

    #[cfg(test)]
    pub fn adapter(&self) -> &A {
        &self.adapter
    }
}

impl<A: MediaBackendAdapter> MediaClient for TokClient<A> {
    fn session(&self) -> &ServerSession {
        &self.session
    }

    fn get_libraries(&self) -> Result<Vec<LibraryHandle>, ClientError> {
        self.adapter.fetch_libraries(&self.session)
    }

    fn get_vertical_videos(&self, query: &FeedQuery) -> Result<FeedPage, ClientError> {
        self.paginator.page(
            &self.adapter,
            &self.favorites,
            &self.session,
            query,
            &self.favorites_scope,
        )
    }

    fn get_favorites(&self, library_name: &str) -> Result<HashSet<String>, ClientError> {
        self.favorites
            .favorite_ids(&self.adapter, &self.session, library_name)
    }

    fn toggle_favorite(
        &self,
        item_id: &str,
        is_currently_favorite: bool,
        library_name: &str,
    ) -> Result<(), ClientError> {
        if is_currently_favorite {
            self.favorites
                .remove(&self.adapter, &self.session, library_name, item_id)
        } else {
            self.favorites
                .add(&self.adapter, &self.session, library_name, item_id)
        }
    }

    fn stream_url(&self, item: &CatalogItem) -> String {
        self.adapter.stream_url(&self.session, item)
    }

    fn image_url(&self, item: &CatalogItem, kind: ImageKind) -> Option<String> {
        self.adapter.image_url(&self.session, item, kind)
    }
}
