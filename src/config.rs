//! Persistent application configuration model and defaults.

use crate::models::FeedType;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Server profile used for login. The password is never stored.
    pub server: ServerConfig,
    #[serde(default)]
    /// Identity and transport preferences.
    pub client: ClientConfig,
    #[serde(default)]
    /// Feed paging preferences.
    pub feed: FeedConfig,
    #[serde(default)]
    /// Library visibility preferences.
    pub libraries: LibrariesConfig,
}

/// Server profile metadata (non-secret fields only).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub server_type: ServerType,
}

/// Supported media server families.
#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerType {
    /// Emby and Jellyfin share the same item/playlist API surface.
    #[default]
    #[serde(alias = "jellyfin")]
    Emby,
    Plex,
}

/// Identity header and HTTP transport preferences.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ClientConfig {
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Feed paging preferences.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct FeedConfig {
    /// Slice size for the favorites feed.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Raw items requested per catalog call, before the vertical filter.
    #[serde(default = "default_catalog_batch_size")]
    pub catalog_batch_size: usize,
    #[serde(default)]
    pub default_feed_type: FeedType,
    /// Library name used for favorites when no library is selected.
    #[serde(default = "default_favorites_scope_name")]
    pub favorites_scope_name: String,
}

/// Library visibility preferences persisted between sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct LibrariesConfig {
    #[serde(default)]
    pub hidden: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            catalog_batch_size: default_catalog_batch_size(),
            default_feed_type: FeedType::Latest,
            favorites_scope_name: default_favorites_scope_name(),
        }
    }
}

fn default_device_name() -> String {
    "Terminal".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_page_size() -> usize {
    15
}

fn default_catalog_batch_size() -> usize {
    100
}

fn default_favorites_scope_name() -> String {
    "收藏".to_string()
}

/// Clamps numeric settings and drops blank entries from hand-edited files.
pub fn sanitize_config(config: Config) -> Config {
    let page_size = config.feed.page_size.clamp(1, 200);
    let catalog_batch_size = config.feed.catalog_batch_size.clamp(page_size, 500);
    let request_timeout_secs = config.client.request_timeout_secs.clamp(1, 300);
    let device_name = match config.client.device_name.trim() {
        "" => default_device_name(),
        trimmed => trimmed.to_string(),
    };
    let favorites_scope_name = match config.feed.favorites_scope_name.trim() {
        "" => default_favorites_scope_name(),
        trimmed => trimmed.to_string(),
    };
    let mut hidden: Vec<String> = config
        .libraries
        .hidden
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    hidden.sort();
    hidden.dedup();

    Config {
        server: ServerConfig {
            url: config.server.url.trim().trim_end_matches('/').to_string(),
            username: config.server.username.trim().to_string(),
            server_type: config.server.server_type,
        },
        client: ClientConfig {
            device_name,
            request_timeout_secs,
        },
        feed: FeedConfig {
            page_size,
            catalog_batch_size,
            default_feed_type: config.feed.default_feed_type,
            favorites_scope_name,
        },
        libraries: LibrariesConfig { hidden },
    }
}
