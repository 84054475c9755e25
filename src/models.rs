//! Domain types shared by adapters, the pagination engine, and the feed coordinator.

use std::fmt;
use std::str::FromStr;

use crate::config::ServerType;

/// Authenticated session against one media server. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSession {
    pub server_url: String,
    pub user_id: String,
    pub username: String,
    pub auth_token: String,
    pub server_type: ServerType,
}

impl ServerSession {
    pub fn from_grant(server_url: &str, server_type: ServerType, grant: AuthGrant) -> Self {
        Self {
            server_url: normalize_server_url(server_url),
            user_id: grant.user_id,
            username: grant.username,
            auth_token: grant.token,
            server_type,
        }
    }
}

/// Result of a successful login exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub token: String,
    pub user_id: String,
    pub username: String,
}

/// One media library (view) on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryHandle {
    pub id: String,
    pub name: String,
}

/// Playable media source attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaSourceRef {
    pub id: String,
    /// Backend-specific locator (Plex part key, Emby source path).
    pub locator: Option<String>,
    pub container: Option<String>,
}

/// One playable catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Duration in 100-nanosecond units.
    pub runtime_ticks: Option<u64>,
    pub image_tag: Option<String>,
    pub media_sources: Vec<MediaSourceRef>,
    pub overview: Option<String>,
}

impl CatalogItem {
    /// Portrait-ish content: `height >= width * 0.8` with a known width.
    ///
    /// Evaluated as `5 * height >= 4 * width` so the boundary is exact.
    pub fn is_vertical(&self) -> bool {
        self.width > 0 && u64::from(self.height) * 5 >= u64::from(self.width) * 4
    }
}

/// A playlist membership record: the item plus the entry id needed to remove it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub item: CatalogItem,
    pub entry_id: Option<String>,
}

/// Playlist identity returned by playlist search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
}

/// Feed selector: chooses the query regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedType {
    #[default]
    Latest,
    Random,
    Favorites,
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Latest => "latest",
            Self::Random => "random",
            Self::Favorites => "favorites",
        };
        f.write_str(label)
    }
}

impl FromStr for FeedType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(Self::Latest),
            "random" => Ok(Self::Random),
            "favorites" | "favourites" | "fav" => Ok(Self::Favorites),
            other => Err(format!("unknown feed type: {other}")),
        }
    }
}

/// Resumable paging position.
///
/// For catalog feeds `skip` counts raw server items consumed before the
/// vertical filter. For the favorites feed it indexes the filtered,
/// reversed favorites list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub skip: usize,
    pub limit: usize,
    pub total_count: Option<usize>,
}

impl PageCursor {
    pub fn start(limit: usize) -> Self {
        Self {
            skip: 0,
            limit,
            total_count: None,
        }
    }

    /// Cursor for the page following `page`.
    pub fn advanced_by(&self, page: &FeedPage) -> Self {
        Self {
            skip: page.next_cursor,
            limit: self.limit,
            total_count: Some(page.total_count),
        }
    }
}

/// Parameters for one page fetch. Rebuilt with `skip = 0` on every reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    pub library: Option<LibraryHandle>,
    pub feed_type: FeedType,
    pub cursor: PageCursor,
}

impl FeedQuery {
    pub fn library_id(&self) -> Option<&str> {
        self.library.as_ref().map(|library| library.id.as_str())
    }
}

/// One shaped page handed to the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPage {
    pub items: Vec<CatalogItem>,
    pub next_cursor: usize,
    pub total_count: usize,
    pub has_more: bool,
}

/// Unfiltered listing batch as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogBatch {
    pub raw_items: Vec<CatalogItem>,
    pub total_count: usize,
}

/// Artwork flavour requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Primary,
    Backdrop,
}

impl ImageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "Primary",
            Self::Backdrop => "Backdrop",
        }
    }
}

/// Trims whitespace and trailing slashes from a user-supplied server URL.
pub fn normalize_server_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
