//! Plex Media Server backend adapter implementation.

use std::sync::Mutex;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::backends::{CatalogRequest, ItemSort, MediaBackendAdapter};
use crate::error::ClientError;
use crate::identity::ClientIdentity;
use crate::models::{
    AuthGrant, CatalogBatch, CatalogItem, ImageKind, LibraryHandle, MediaSourceRef,
    PlaylistEntry, PlaylistSummary, ServerSession,
};

const PLEX_SIGN_IN_URL: &str = "https://plex.tv/users/sign_in.json";
const LIBRARY_PROVIDER: &str = "com.plexapp.plugins.library";
const MOVIE_TYPE: &str = "1";
const IMAGE_SIZE: u32 = 800;
const NON_VIDEO_SECTION_TYPES: &[&str] = &["artist", "photo"];
const TICKS_PER_MILLISECOND: u64 = 10_000;

#[derive(Debug, Deserialize)]
struct PlexSignInPayload {
    user: PlexAccount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlexAccount {
    auth_token: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    username: String,
}

#[derive(Debug, Deserialize)]
struct PlexResponse<T> {
    #[serde(rename = "MediaContainer")]
    media_container: T,
}

#[derive(Debug, Deserialize)]
struct PlexSectionsContainer {
    #[serde(rename = "Directory", default)]
    directory: Vec<PlexSectionDirectory>,
}

#[derive(Debug, Deserialize)]
struct PlexSectionDirectory {
    key: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "type", default)]
    type_: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlexIdentityContainer {
    machine_identifier: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlexMetadataContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<PlexMetadata>,
    #[serde(default)]
    total_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlexMetadata {
    rating_key: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    thumb: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(rename = "Media", default)]
    media: Vec<PlexMedia>,
    #[serde(rename = "playlistItemID", default)]
    playlist_item_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PlexMedia {
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    container: Option<String>,
    #[serde(rename = "Part", default)]
    part: Vec<PlexPart>,
}

#[derive(Debug, Deserialize)]
struct PlexPart {
    #[serde(default)]
    id: Option<u64>,
    key: String,
    #[serde(default)]
    container: Option<String>,
}

impl PlexMetadata {
    fn into_catalog_item(self) -> CatalogItem {
        let (width, height) = self
            .media
            .first()
            .map(|media| (media.width.unwrap_or(0), media.height.unwrap_or(0)))
            .unwrap_or((0, 0));
        let media_sources = self
            .media
            .iter()
            .flat_map(|media| {
                media.part.iter().map(move |part| MediaSourceRef {
                    id: part.id.map(|id| id.to_string()).unwrap_or_default(),
                    locator: Some(part.key.clone()),
                    container: part.container.clone().or_else(|| media.container.clone()),
                })
            })
            .collect();
        CatalogItem {
            id: self.rating_key,
            name: self.title,
            width,
            height,
            runtime_ticks: self
                .duration
                .map(|millis| millis.saturating_mul(TICKS_PER_MILLISECOND)),
            image_tag: self.thumb.filter(|thumb| !thumb.is_empty()),
            media_sources,
            overview: self.summary.filter(|text| !text.trim().is_empty()),
        }
    }

    fn into_playlist_entry(mut self) -> PlaylistEntry {
        let entry_id = self.playlist_item_id.take().map(|id| id.to_string());
        PlaylistEntry {
            item: self.into_catalog_item(),
            entry_id,
        }
    }
}

fn basic_authorization(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        BASE64_STANDARD.encode(format!("{username}:{password}"))
    )
}

/// Path and query parameters for a catalog listing call.
fn items_request(request: &CatalogRequest) -> (String, Vec<(&'static str, String)>) {
    let mut params = Vec::new();
    let path = match request
        .parent_id
        .as_deref()
        .filter(|parent_id| !parent_id.is_empty())
    {
        Some(parent_id) => format!(
            "/library/sections/{}/allLeaves",
            urlencoding::encode(parent_id)
        ),
        None => {
            params.push(("type", MOVIE_TYPE.to_string()));
            "/library/all".to_string()
        }
    };
    let sort = match request.sort {
        ItemSort::Random => "random",
        ItemSort::DateCreatedDescending => "addedAt:desc",
    };
    params.push(("sort", sort.to_string()));
    params.push(("X-Plex-Container-Start", request.start_index.to_string()));
    params.push(("X-Plex-Container-Size", request.limit.to_string()));
    (path, params)
}

fn parse_metadata_container(container: PlexMetadataContainer, start_index: usize) -> CatalogBatch {
    let raw_items: Vec<CatalogItem> = container
        .metadata
        .into_iter()
        .map(PlexMetadata::into_catalog_item)
        .collect();
    let total_count = container
        .total_size
        .unwrap_or_else(|| start_index.saturating_add(raw_items.len()));
    CatalogBatch {
        raw_items,
        total_count,
    }
}

fn library_item_uri(machine_id: &str, item_id: &str) -> String {
    format!("server://{machine_id}/{LIBRARY_PROVIDER}/library/metadata/{item_id}")
}

/// Plex adapter backed by `ureq`.
pub struct PlexAdapter {
    http_client: ureq::Agent,
    identity: ClientIdentity,
    machine_identifier: Mutex<Option<String>>,
}

impl PlexAdapter {
    /// Creates a new Plex adapter.
    pub fn new(identity: ClientIdentity, timeout: Duration) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self {
            http_client,
            identity,
            machine_identifier: Mutex::new(None),
        }
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
        debug!("PlexAdapter: {} {} ({})", method, path, action);
        let mut request = self.http_client.request(method, &url);
        for (name, value) in self.identity.plex_headers(Some(&session.auth_token)) {
            request = request.set(name, &value);
        }
        for (key, value) in params {
            request = request.query(key, value);
        }
        request
            .call()
            .map_err(|err| ClientError::fetch(action, err))
    }

    fn get_container<T: DeserializeOwned>(
        &self,
        session: &ServerSession,
        action: &str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ClientError> {
        self.send(session, "GET", action, path, params)?
            .into_json::<PlexResponse<T>>()
            .map(|response| response.media_container)
            .map_err(|err| ClientError::decode(action, err))
    }

    /// Server machine identifier, fetched once and cached for playlist URIs.
    fn machine_identifier(&self, session: &ServerSession) -> Result<String, ClientError> {
        let cached = match self.machine_identifier.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(machine_id) = cached {
            return Ok(machine_id);
        }

        let container: PlexIdentityContainer =
            self.get_container(session, "server identity", "/identity", &[])?;
        let machine_id = container.machine_identifier;
        match self.machine_identifier.lock() {
            Ok(mut guard) => *guard = Some(machine_id.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(machine_id.clone()),
        }
        Ok(machine_id)
    }

    fn playlist_items_path(playlist_id: &str) -> String {
        format!("/playlists/{}/items", urlencoding::encode(playlist_id))
    }

    fn transcode_url(session: &ServerSession, item_id: &str) -> String {
        let metadata_path = format!("/library/metadata/{item_id}");
        format!(
            "{}/video/:/transcode/universal/start.m3u8?path={}&mediaIndex=0&partIndex=0&protocol=hls&X-Plex-Token={}",
            session.server_url,
            urlencoding::encode(&metadata_path),
            urlencoding::encode(&session.auth_token)
        )
    }
}

impl MediaBackendAdapter for PlexAdapter {
    fn authenticate(
        &self,
        _server_url: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthGrant, ClientError> {
        let mut request = self
            .http_client
            .post(PLEX_SIGN_IN_URL)
            .set("Authorization", &basic_authorization(username, password));
        for (name, value) in self.identity.plex_headers(None) {
            request = request.set(name, &value);
        }
        let payload: PlexSignInPayload = request
            .call()
            .map_err(ClientError::auth)?
            .into_json()
            .map_err(|err| ClientError::Auth(format!("unexpected sign-in response: {err}")))?;
        let account = payload.user;
        Ok(AuthGrant {
            token: account.auth_token,
            user_id: account.id.map(|id| id.to_string()).unwrap_or_default(),
            username: if account.username.is_empty() {
                username.to_string()
            } else {
                account.username
            },
        })
    }

    fn fetch_libraries(&self, session: &ServerSession) -> Result<Vec<LibraryHandle>, ClientError> {
        let container: PlexSectionsContainer =
            self.get_container(session, "libraries", "/library/sections", &[])?;
        Ok(container
            .directory
            .into_iter()
            .filter(|section| {
                !section
                    .type_
                    .as_deref()
                    .is_some_and(|kind| NON_VIDEO_SECTION_TYPES.contains(&kind))
            })
            .map(|section| LibraryHandle {
                id: section.key,
                name: section.title,
            })
            .collect())
    }

    fn fetch_items(
        &self,
        session: &ServerSession,
        request: &CatalogRequest,
    ) -> Result<CatalogBatch, ClientError> {
        let (path, params) = items_request(request);
        let container: PlexMetadataContainer =
            self.get_container(session, "items", &path, &params)?;
        Ok(parse_metadata_container(container, request.start_index))
    }

    fn fetch_playlists(
        &self,
        session: &ServerSession,
    ) -> Result<Vec<PlaylistSummary>, ClientError> {
        let container: PlexMetadataContainer = self.get_container(
            session,
            "playlist search",
            "/playlists",
            &[("playlistType", "video".to_string())],
        )?;
        Ok(container
            .metadata
            .into_iter()
            .map(|playlist| PlaylistSummary {
                id: playlist.rating_key,
                name: playlist.title,
            })
            .collect())
    }

    fn create_playlist(&self, session: &ServerSession, name: &str) -> Result<String, ClientError> {
        let trimmed_name = name.trim();
        if trimmed_name.is_empty() {
            return Err(ClientError::Fetch("playlist name cannot be empty".to_string()));
        }
        let machine_id = self.machine_identifier(session)?;
        let container: PlexMetadataContainer = self
            .send(
                session,
                "POST",
                "create playlist",
                "/playlists",
                &[
                    ("type", "video".to_string()),
                    ("title", trimmed_name.to_string()),
                    ("smart", "0".to_string()),
                    ("uri", format!("server://{machine_id}/{LIBRARY_PROVIDER}")),
                ],
            )?
            .into_json::<PlexResponse<PlexMetadataContainer>>()
            .map(|response| response.media_container)
            .map_err(|err| ClientError::decode("create playlist", err))?;
        container
            .metadata
            .into_iter()
            .next()
            .map(|playlist| playlist.rating_key)
            .ok_or_else(|| ClientError::Fetch("create playlist returned no playlist".to_string()))
    }

    fn fetch_playlist_items(
        &self,
        session: &ServerSession,
        playlist_id: &str,
    ) -> Result<Vec<CatalogItem>, ClientError> {
        let container: PlexMetadataContainer = self.get_container(
            session,
            "playlist items",
            &Self::playlist_items_path(playlist_id),
            &[],
        )?;
        Ok(container
            .metadata
            .into_iter()
            .map(PlexMetadata::into_catalog_item)
            .collect())
    }

    fn fetch_playlist_entries(
        &self,
        session: &ServerSession,
        playlist_id: &str,
    ) -> Result<Vec<PlaylistEntry>, ClientError> {
        let container: PlexMetadataContainer = self.get_container(
            session,
            "playlist entries",
            &Self::playlist_items_path(playlist_id),
            &[],
        )?;
        Ok(container
            .metadata
            .into_iter()
            .map(PlexMetadata::into_playlist_entry)
            .collect())
    }

    fn add_playlist_item(
        &self,
        session: &ServerSession,
        playlist_id: &str,
        item_id: &str,
    ) -> Result<(), ClientError> {
        let machine_id = self.machine_identifier(session)?;
        let _ = self.send(
            session,
            "PUT",
            "add playlist item",
            &Self::playlist_items_path(playlist_id),
            &[("uri", library_item_uri(&machine_id, item_id))],
        )?;
        Ok(())
    }

    fn remove_playlist_entry(
        &self,
        session: &ServerSession,
        playlist_id: &str,
        entry_id: &str,
    ) -> Result<(), ClientError> {
        let path = format!(
            "{}/{}",
            Self::playlist_items_path(playlist_id),
            urlencoding::encode(entry_id)
        );
        let _ = self.send(session, "DELETE", "remove playlist entry", &path, &[])?;
        Ok(())
    }

    fn stream_url(&self, session: &ServerSession, item: &CatalogItem) -> String {
        let part_key = item
            .media_sources
            .iter()
            .find_map(|source| source.locator.as_deref())
            .filter(|key| key.starts_with('/'));
        match part_key {
            Some(key) => format!(
                "{}{}?X-Plex-Token={}",
                session.server_url,
                key,
                urlencoding::encode(&session.auth_token)
            ),
            None => Self::transcode_url(session, &item.id),
        }
    }

    fn image_url(
        &self,
        session: &ServerSession,
        item: &CatalogItem,
        _kind: ImageKind,
    ) -> Option<String> {
        let thumb = item.image_tag.as_deref().filter(|thumb| !thumb.is_empty())?;
        Some(format!(
            "{}/photo/:/transcode?width={size}&height={size}&minSize=1&url={}&X-Plex-Token={}",
            session.server_url,
            urlencoding::encode(thumb),
            urlencoding::encode(&session.auth_token),
            size = IMAGE_SIZE
        ))
    }
}
