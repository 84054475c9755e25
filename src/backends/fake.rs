//! In-memory adapter used by coordinator and pagination tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::backends::{CatalogRequest, ItemSort, MediaBackendAdapter};
use crate::error::ClientError;
use crate::models::{
    AuthGrant, CatalogBatch, CatalogItem, ImageKind, LibraryHandle, PlaylistEntry,
    PlaylistSummary, ServerSession,
};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    Authenticate,
    Libraries,
    Items,
    Playlists,
    CreatePlaylist,
    PlaylistItems,
    PlaylistEntries,
    AddItem,
    RemoveEntry,
}

#[derive(Debug, Clone)]
struct FakePlaylist {
    id: String,
    name: String,
    entries: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct FakeState {
    libraries: Vec<LibraryHandle>,
    catalog: HashMap<Option<String>, Vec<CatalogItem>>,
    reported_totals: HashMap<Option<String>, usize>,
    playlists: Vec<FakePlaylist>,
    next_id: usize,
    failing: HashSet<FakeOp>,
    calls: Vec<String>,
    item_requests: Vec<CatalogRequest>,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn check(&mut self, op: FakeOp, call: String) -> Result<(), ClientError> {
        self.calls.push(call);
        if self.failing.contains(&op) {
            let message = format!("{op:?} failed");
            return Err(match op {
                FakeOp::Authenticate => ClientError::Auth(message),
                _ => ClientError::Fetch(message),
            });
        }
        Ok(())
    }

    fn lookup_item(&self, item_id: &str) -> CatalogItem {
        self.catalog
            .values()
            .flatten()
            .find(|item| item.id == item_id)
            .cloned()
            .unwrap_or_else(|| CatalogItem {
                id: item_id.to_string(),
                ..CatalogItem::default()
            })
    }

    fn playlist_mut(&mut self, playlist_id: &str) -> Result<&mut FakePlaylist, ClientError> {
        self.playlists
            .iter_mut()
            .find(|playlist| playlist.id == playlist_id)
            .ok_or_else(|| ClientError::Fetch(format!("unknown playlist {playlist_id}")))
    }
}

/// Adapter that serves a scripted catalog and records every call.
#[derive(Debug, Default)]
pub struct FakeAdapter {
    state: Mutex<FakeState>,
}

impl FakeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake adapter state lock poisoned")
    }

    /// Adds a library whose catalog listing serves `items` in order.
    pub fn with_library(self, id: &str, name: &str, items: Vec<CatalogItem>) -> Self {
        {
            let mut state = self.state();
            state.libraries.push(LibraryHandle {
                id: id.to_string(),
                name: name.to_string(),
            });
            state.catalog.insert(Some(id.to_string()), items);
        }
        self
    }

    /// Catalog served when no library is selected.
    pub fn with_global_items(self, items: Vec<CatalogItem>) -> Self {
        self.state().catalog.insert(None, items);
        self
    }

    /// Overrides the total the server reports for one scope.
    pub fn with_reported_total(self, library_id: Option<&str>, total: usize) -> Self {
        self.state()
            .reported_totals
            .insert(library_id.map(str::to_string), total);
        self
    }

    /// Creates a playlist holding `item_ids` in append order.
    pub fn seed_playlist(&self, name: &str, item_ids: &[&str]) -> String {
        let mut state = self.state();
        let id = state.next_id("playlist");
        let mut entries = Vec::new();
        for item_id in item_ids {
            let entry_id = state.next_id("entry");
            entries.push((entry_id, (*item_id).to_string()));
        }
        state.playlists.push(FakePlaylist {
            id: id.clone(),
            name: name.to_string(),
            entries,
        });
        id
    }

    pub fn set_failing(&self, op: FakeOp, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing.insert(op);
        } else {
            state.failing.remove(&op);
        }
    }

    /// Item ids of the first playlist named `name`, in append order.
    pub fn playlist_item_ids(&self, name: &str) -> Option<Vec<String>> {
        self.state()
            .playlists
            .iter()
            .find(|playlist| playlist.name == name)
            .map(|playlist| {
                playlist
                    .entries
                    .iter()
                    .map(|(_, item_id)| item_id.clone())
                    .collect()
            })
    }

    pub fn playlist_count(&self, name: &str) -> usize {
        self.state()
            .playlists
            .iter()
            .filter(|playlist| playlist.name == name)
            .count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn item_requests(&self) -> Vec<CatalogRequest> {
        self.state().item_requests.clone()
    }
}

impl MediaBackendAdapter for FakeAdapter {
    fn authenticate(
        &self,
        _server_url: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthGrant, ClientError> {
        let mut state = self.state();
        state.check(FakeOp::Authenticate, format!("authenticate {username}"))?;
        if password.is_empty() {
            return Err(ClientError::Auth("empty password".to_string()));
        }
        Ok(AuthGrant {
            token: format!("token-{username}"),
            user_id: format!("user-{username}"),
            username: username.to_string(),
        })
    }

    fn fetch_libraries(&self, _session: &ServerSession) -> Result<Vec<LibraryHandle>, ClientError> {
        let mut state = self.state();
        state.check(FakeOp::Libraries, "libraries".to_string())?;
        Ok(state.libraries.clone())
    }

    fn fetch_items(
        &self,
        _session: &ServerSession,
        request: &CatalogRequest,
    ) -> Result<CatalogBatch, ClientError> {
        let mut state = self.state();
        state.check(
            FakeOp::Items,
            format!(
                "items {} {}",
                request.parent_id.as_deref().unwrap_or("*"),
                request.start_index
            ),
        )?;
        state.item_requests.push(request.clone());
        let items = state
            .catalog
            .get(&request.parent_id)
            .cloned()
            .unwrap_or_default();
        let total_count = state
            .reported_totals
            .get(&request.parent_id)
            .copied()
            .unwrap_or(items.len());
        let mut raw_items: Vec<CatalogItem> = items
            .into_iter()
            .skip(request.start_index)
            .take(request.limit)
            .collect();
        if request.sort == ItemSort::Random {
            raw_items.reverse();
        }
        Ok(CatalogBatch {
            raw_items,
            total_count,
        })
    }

    fn fetch_playlists(
        &self,
        _session: &ServerSession,
    ) -> Result<Vec<PlaylistSummary>, ClientError> {
        let mut state = self.state();
        state.check(FakeOp::Playlists, "playlists".to_string())?;
        Ok(state
            .playlists
            .iter()
            .map(|playlist| PlaylistSummary {
                id: playlist.id.clone(),
                name: playlist.name.clone(),
            })
            .collect())
    }

    fn create_playlist(&self, _session: &ServerSession, name: &str) -> Result<String, ClientError> {
        let mut state = self.state();
        state.check(FakeOp::CreatePlaylist, format!("create {name}"))?;
        let id = state.next_id("playlist");
        state.playlists.push(FakePlaylist {
            id: id.clone(),
            name: name.to_string(),
            entries: Vec::new(),
        });
        Ok(id)
    }

    fn fetch_playlist_items(
        &self,
        _session: &ServerSession,
        playlist_id: &str,
    ) -> Result<Vec<CatalogItem>, ClientError> {
        let mut state = self.state();
        state.check(FakeOp::PlaylistItems, format!("playlist items {playlist_id}"))?;
        let entries = state.playlist_mut(playlist_id)?.entries.clone();
        Ok(entries
            .iter()
            .map(|(_, item_id)| state.lookup_item(item_id))
            .collect())
    }

    fn fetch_playlist_entries(
        &self,
        _session: &ServerSession,
        playlist_id: &str,
    ) -> Result<Vec<PlaylistEntry>, ClientError> {
        let mut state = self.state();
        state.check(
            FakeOp::PlaylistEntries,
            format!("playlist entries {playlist_id}"),
        )?;
        let entries = state.playlist_mut(playlist_id)?.entries.clone();
        Ok(entries
            .iter()
            .map(|(entry_id, item_id)| PlaylistEntry {
                item: state.lookup_item(item_id),
                entry_id: Some(entry_id.clone()),
            })
            .collect())
    }

    fn add_playlist_item(
        &self,
        _session: &ServerSession,
        playlist_id: &str,
        item_id: &str,
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        state.check(FakeOp::AddItem, format!("add {playlist_id} {item_id}"))?;
        let entry_id = state.next_id("entry");
        state
            .playlist_mut(playlist_id)?
            .entries
            .push((entry_id, item_id.to_string()));
        Ok(())
    }

    fn remove_playlist_entry(
        &self,
        _session: &ServerSession,
        playlist_id: &str,
        entry_id: &str,
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        state.check(FakeOp::RemoveEntry, format!("remove {playlist_id} {entry_id}"))?;
        state
            .playlist_mut(playlist_id)?
            .entries
            .retain(|(existing, _)| existing != entry_id);
        Ok(())
    }

    fn stream_url(&self, session: &ServerSession, item: &CatalogItem) -> String {
        format!("{}/stream/{}", session.server_url, item.id)
    }

    fn image_url(
        &self,
        session: &ServerSession,
        item: &CatalogItem,
        kind: ImageKind,
    ) -> Option<String> {
        item.image_tag
            .as_ref()
            .map(|tag| format!("{}/image/{}/{}/{}", session.server_url, item.id, kind.as_str(), tag))
    }
}

/// Item with explicit dimensions.
pub fn sized_item(id: &str, width: u32, height: u32) -> CatalogItem {
    CatalogItem {
        id: id.to_string(),
        name: format!("Item {id}"),
        width,
        height,
        ..CatalogItem::default()
    }
}

/// Portrait 1080x1920 item.
pub fn vertical_item(id: &str) -> CatalogItem {
    sized_item(id, 1080, 1920)
}

/// Landscape 1920x1080 item.
pub fn landscape_item(id: &str) -> CatalogItem {
    sized_item(id, 1920, 1080)
}

pub fn test_session() -> ServerSession {
    ServerSession {
        server_url: "https://media.example.com".to_string(),
        user_id: "user-1".to_string(),
        username: "alice".to_string(),
        auth_token: "token-1".to_string(),
        server_type: crate::config::ServerType::Emby,
    }
}
