//! Favorites stored as one backend playlist per library.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use log::{debug, info, warn};

use crate::backends::MediaBackendAdapter;
use crate::error::ClientError;
use crate::models::{CatalogItem, ServerSession};

const FAVORITES_PLAYLIST_PREFIX: &str = "Tok-";

/// Name of the playlist backing favorites for `library_name`.
pub fn favorites_playlist_name(library_name: &str) -> String {
    format!("{FAVORITES_PLAYLIST_PREFIX}{library_name}")
}

/// Maps per-library favorite sets onto `Tok-{library}` playlists.
///
/// Playlists are resolved lazily: searched by name on first use and created
/// when missing. Resolved ids are cached for the life of the session. Two
/// concurrent first uses may both create a playlist; the later id wins the
/// cache and the duplicate is left on the server.
#[derive(Debug, Default)]
pub struct FavoritesEmulator {
    playlist_ids: Mutex<HashMap<String, String>>,
}

impl FavoritesEmulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn cached_playlist_id(&self, playlist_name: &str) -> Option<String> {
        match self.playlist_ids.lock() {
            Ok(cache) => cache.get(playlist_name).cloned(),
            Err(poisoned) => poisoned.into_inner().get(playlist_name).cloned(),
        }
    }

    fn remember_playlist_id(&self, playlist_name: &str, playlist_id: &str) {
        let mut cache = match self.playlist_ids.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.insert(playlist_name.to_string(), playlist_id.to_string());
    }

    /// Returns the playlist id for `library_name`, searching then creating it.
    pub fn resolve_playlist(
        &self,
        adapter: &dyn MediaBackendAdapter,
        session: &ServerSession,
        library_name: &str,
    ) -> Result<String, ClientError> {
        let playlist_name = favorites_playlist_name(library_name);
        if let Some(playlist_id) = self.cached_playlist_id(&playlist_name) {
            return Ok(playlist_id);
        }

        let existing = match adapter.fetch_playlists(session) {
            Ok(playlists) => playlists
                .into_iter()
                .find(|playlist| playlist.name == playlist_name)
                .map(|playlist| playlist.id),
            Err(err) => {
                warn!(
                    "FavoritesEmulator: playlist search for {} failed, creating instead: {}",
                    playlist_name, err
                );
                None
            }
        };

        let playlist_id = match existing {
            Some(playlist_id) => {
                debug!(
                    "FavoritesEmulator: found playlist {} ({})",
                    playlist_name, playlist_id
                );
                playlist_id
            }
            None => {
                let playlist_id = adapter.create_playlist(session, &playlist_name)?;
                info!(
                    "FavoritesEmulator: created playlist {} ({})",
                    playlist_name, playlist_id
                );
                playlist_id
            }
        };
        self.remember_playlist_id(&playlist_name, &playlist_id);
        Ok(playlist_id)
    }

    /// Favorited items in playlist append order (oldest favorite first).
    pub fn list_members(
        &self,
        adapter: &dyn MediaBackendAdapter,
        session: &ServerSession,
        library_name: &str,
    ) -> Result<Vec<CatalogItem>, ClientError> {
        let playlist_id = self.resolve_playlist(adapter, session, library_name)?;
        adapter.fetch_playlist_items(session, &playlist_id)
    }

    /// Ids of every favorited item in the scope.
    pub fn favorite_ids(
        &self,
        adapter: &dyn MediaBackendAdapter,
        session: &ServerSession,
        library_name: &str,
    ) -> Result<HashSet<String>, ClientError> {
        Ok(self
            .list_members(adapter, session, library_name)?
            .into_iter()
            .map(|item| item.id)
            .collect())
    }

    pub fn add(
        &self,
        adapter: &dyn MediaBackendAdapter,
        session: &ServerSession,
        library_name: &str,
        item_id: &str,
    ) -> Result<(), ClientError> {
        let playlist_id = self.resolve_playlist(adapter, session, library_name)?;
        adapter.add_playlist_item(session, &playlist_id, item_id)
    }

    /// Removes `item_id` via its entry id. Missing members are a no-op.
    pub fn remove(
        &self,
        adapter: &dyn MediaBackendAdapter,
        session: &ServerSession,
        library_name: &str,
        item_id: &str,
    ) -> Result<(), ClientError> {
        let playlist_id = self.resolve_playlist(adapter, session, library_name)?;
        let entry_id = adapter
            .fetch_playlist_entries(session, &playlist_id)?
            .into_iter()
            .find(|entry| entry.item.id == item_id)
            .and_then(|entry| entry.entry_id);
        match entry_id {
            Some(entry_id) => adapter.remove_playlist_entry(session, &playlist_id, &entry_id),
            None => {
                debug!(
                    "FavoritesEmulator: {} is not in playlist {}, nothing to remove",
                    item_id, playlist_id
                );
                Ok(())
            }
        }
    }
}
