//! Emby/Jellyfin backend adapter implementation.

use std::collections::HashMap;
use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::backends::{CatalogRequest, ItemSort, MediaBackendAdapter};
use crate::error::ClientError;
use crate::identity::ClientIdentity;
use crate::models::{
    normalize_server_url, AuthGrant, CatalogBatch, CatalogItem, ImageKind, LibraryHandle,
    MediaSourceRef, PlaylistEntry, PlaylistSummary, ServerSession,
};

const AUTH_HEADER: &str = "X-Emby-Authorization";
const PLAYABLE_ITEM_TYPES: &str = "Movie,Video,Episode";
const ITEM_FIELDS: &str = "MediaSources,Width,Height,Overview,UserData";
const IMAGE_MAX_WIDTH: u32 = 800;
const IMAGE_QUALITY: u32 = 90;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EmbyAuthPayload {
    access_token: String,
    user: EmbyUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EmbyUser {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EmbyItemsPayload {
    #[serde(default)]
    items: Vec<EmbyItem>,
    #[serde(default)]
    total_record_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EmbyItem {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    run_time_ticks: Option<u64>,
    #[serde(default)]
    image_tags: HashMap<String, String>,
    #[serde(default)]
    media_sources: Vec<EmbyMediaSource>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    playlist_item_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EmbyMediaSource {
    #[serde(default)]
    id: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    container: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EmbyCreatedPayload {
    id: String,
}

impl EmbyItem {
    fn into_catalog_item(self) -> CatalogItem {
        let image_tag = self.image_tags.get("Primary").cloned();
        CatalogItem {
            id: self.id,
            name: self.name,
            width: self.width.unwrap_or(0),
            height: self.height.unwrap_or(0),
            runtime_ticks: self.run_time_ticks,
            image_tag,
            media_sources: self
                .media_sources
                .into_iter()
                .map(|source| MediaSourceRef {
                    id: source.id,
                    locator: source.path,
                    container: source.container,
                })
                .collect(),
            overview: self.overview.filter(|text| !text.trim().is_empty()),
        }
    }

    fn into_playlist_entry(mut self) -> PlaylistEntry {
        let entry_id = self
            .playlist_item_id
            .take()
            .filter(|entry_id| !entry_id.trim().is_empty());
        PlaylistEntry {
            item: self.into_catalog_item(),
            entry_id,
        }
    }
}

/// Query parameters for a catalog listing call.
fn items_query(request: &CatalogRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("IncludeItemTypes", PLAYABLE_ITEM_TYPES.to_string()),
        ("Recursive", "true".to_string()),
        ("Fields", ITEM_FIELDS.to_string()),
        ("StartIndex", request.start_index.to_string()),
        ("Limit", request.limit.to_string()),
        ("ImageTypeLimit", "1".to_string()),
        ("EnableImageTypes", "Primary,Backdrop,Banner,Thumb".to_string()),
    ];
    match request.sort {
        ItemSort::Random => params.push(("SortBy", "Random".to_string())),
        ItemSort::DateCreatedDescending => {
            params.push(("SortBy", "DateCreated".to_string()));
            params.push(("SortOrder", "Descending".to_string()));
        }
    }
    if let Some(parent_id) = request
        .parent_id
        .as_deref()
        .filter(|parent_id| !parent_id.is_empty())
    {
        params.push(("ParentId", parent_id.to_string()));
    }
    params
}

fn parse_items_payload(
    payload: EmbyItemsPayload,
    start_index: usize,
) -> CatalogBatch {
    let raw_items: Vec<CatalogItem> = payload
        .items
        .into_iter()
        .map(EmbyItem::into_catalog_item)
        .collect();
    let total_count = payload
        .total_record_count
        .unwrap_or_else(|| start_index.saturating_add(raw_items.len()));
    CatalogBatch {
        raw_items,
        total_count,
    }
}

/// Emby adapter backed by `ureq`.
pub struct EmbyAdapter {
    http_client: ureq::Agent,
    identity: ClientIdentity,
}

impl EmbyAdapter {
    /// Creates a new Emby adapter.
    pub fn new(identity: ClientIdentity, timeout: Duration) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self {
            http_client,
            identity,
        }
    }

    fn user_path(session: &ServerSession, suffix: &str) -> String {
        format!(
            "/Users/{}/{}",
            urlencoding::encode(&session.user_id),
            suffix
        )
    }

    fn playlist_items_path(playlist_id: &str) -> String {
        format!("/Playlists/{}/Items", urlencoding::encode(playlist_id))
    }

    fn send(
        &self,
        session: &ServerSession,
        method: &str,
        action: &str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<ureq::Response, ClientError> {
        let url = format!("{}{}", session.server_url, path);
        debug!("EmbyAdapter: {} {} ({})", method, path, action);
        let mut request = self
            .http_client
            .request(method, &url)
            .set(
                AUTH_HEADER,
                &self.identity.emby_authorization(Some(&session.auth_token)),
            )
            .set("Content-Type", "application/json");
        for (key, value) in params {
            request = request.query(key, value);
        }
        request
            .call()
            .map_err(|err| ClientError::fetch(action, err))
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        session: &ServerSession,
        action: &str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ClientError> {
        self.send(session, "GET", action, path, params)?
            .into_json::<T>()
            .map_err(|err| ClientError::decode(action, err))
    }
}

impl MediaBackendAdapter for EmbyAdapter {
    fn authenticate(
        &self,
        server_url: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthGrant, ClientError> {
        let url = format!("{}/Users/AuthenticateByName", normalize_server_url(server_url));
        let response = self
            .http_client
            .post(&url)
            .set(AUTH_HEADER, &self.identity.emby_authorization(None))
            .send_json(serde_json::json!({
                "Username": username,
                "Pw": password,
            }))
            .map_err(ClientError::auth)?;
        let payload: EmbyAuthPayload = response
            .into_json()
            .map_err(|err| ClientError::Auth(format!("unexpected login response: {err}")))?;
        Ok(AuthGrant {
            token: payload.access_token,
            user_id: payload.user.id,
            username: payload.user.name,
        })
    }

    fn fetch_libraries(&self, session: &ServerSession) -> Result<Vec<LibraryHandle>, ClientError> {
        let payload: EmbyItemsPayload =
            self.get_json(session, "libraries", &Self::user_path(session, "Views"), &[])?;
        Ok(payload
            .items
            .into_iter()
            .map(|item| LibraryHandle {
                id: item.id,
                name: item.name,
            })
            .collect())
    }

    fn fetch_items(
        &self,
        session: &ServerSession,
        request: &CatalogRequest,
    ) -> Result<CatalogBatch, ClientError> {
        let payload: EmbyItemsPayload = self.get_json(
            session,
            "items",
            &Self::user_path(session, "Items"),
            &items_query(request),
        )?;
        Ok(parse_items_payload(payload, request.start_index))
    }

    fn fetch_playlists(
        &self,
        session: &ServerSession,
    ) -> Result<Vec<PlaylistSummary>, ClientError> {
        let payload: EmbyItemsPayload = self.get_json(
            session,
            "playlist search",
            &Self::user_path(session, "Items"),
            &[
                ("IncludeItemTypes", "Playlist".to_string()),
                ("Recursive", "true".to_string()),
                ("Fields", "Id,Name".to_string()),
            ],
        )?;
        Ok(payload
            .items
            .into_iter()
            .map(|item| PlaylistSummary {
                id: item.id,
                name: item.name,
            })
            .collect())
    }

    fn create_playlist(&self, session: &ServerSession, name: &str) -> Result<String, ClientError> {
        let trimmed_name = name.trim();
        if trimmed_name.is_empty() {
            return Err(ClientError::Fetch("playlist name cannot be empty".to_string()));
        }
        let payload: EmbyCreatedPayload = self
            .send(
                session,
                "POST",
                "create playlist",
                "/Playlists",
                &[
                    ("Name", trimmed_name.to_string()),
                    ("UserId", session.user_id.clone()),
                ],
            )?
            .into_json()
            .map_err(|err| ClientError::decode("create playlist", err))?;
        Ok(payload.id)
    }

    fn fetch_playlist_items(
        &self,
        session: &ServerSession,
        playlist_id: &str,
    ) -> Result<Vec<CatalogItem>, ClientError> {
        let payload: EmbyItemsPayload = self.get_json(
            session,
            "playlist items",
            &Self::playlist_items_path(playlist_id),
            &[
                ("UserId", session.user_id.clone()),
                ("Fields", ITEM_FIELDS.to_string()),
            ],
        )?;
        Ok(payload
            .items
            .into_iter()
            .map(EmbyItem::into_catalog_item)
            .collect())
    }

    fn fetch_playlist_entries(
        &self,
        session: &ServerSession,
        playlist_id: &str,
    ) -> Result<Vec<PlaylistEntry>, ClientError> {
        let payload: EmbyItemsPayload = self.get_json(
            session,
            "playlist entries",
            &Self::playlist_items_path(playlist_id),
            &[
                ("Fields", "Id,PlaylistItemId".to_string()),
                ("UserId", session.user_id.clone()),
            ],
        )?;
        Ok(payload
            .items
            .into_iter()
            .map(EmbyItem::into_playlist_entry)
            .collect())
    }

    fn add_playlist_item(
        &self,
        session: &ServerSession,
        playlist_id: &str,
        item_id: &str,
    ) -> Result<(), ClientError> {
        let _ = self.send(
            session,
            "POST",
            "add playlist item",
            &Self::playlist_items_path(playlist_id),
            &[
                ("Ids", item_id.to_string()),
                ("UserId", session.user_id.clone()),
            ],
        )?;
        Ok(())
    }

    fn remove_playlist_entry(
        &self,
        session: &ServerSession,
        playlist_id: &str,
        entry_id: &str,
    ) -> Result<(), ClientError> {
        let _ = self.send(
            session,
            "DELETE",
            "remove playlist entry",
            &Self::playlist_items_path(playlist_id),
            &[("EntryIds", entry_id.to_string())],
        )?;
        Ok(())
    }

    fn stream_url(&self, session: &ServerSession, item: &CatalogItem) -> String {
        format!(
            "{}/Videos/{}/stream.mp4?Static=true&api_key={}",
            session.server_url,
            urlencoding::encode(&item.id),
            urlencoding::encode(&session.auth_token)
        )
    }

    fn image_url(
        &self,
        session: &ServerSession,
        item: &CatalogItem,
        kind: ImageKind,
    ) -> Option<String> {
        let tag = item.image_tag.as_deref().filter(|tag| !tag.is_empty())?;
        Some(format!(
            "{}/Items/{}/Images/{}?maxWidth={}&tag={}&quality={}",
            session.server_url,
            urlencoding::encode(&item.id),
            kind.as_str(),
            IMAGE_MAX_WIDTH,
            urlencoding::encode(tag),
            IMAGE_QUALITY
        ))
    }
}
