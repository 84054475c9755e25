use std::path::{Path, PathBuf};

use log::{info, warn};
use toml_edit::{value, Array, DocumentMut, Item, Table};

use crate::config::{sanitize_config, Config, ServerType};
use crate::models::FeedType;

const CONFIG_DIR_NAME: &str = "embytok";
const CONFIG_FILE_NAME: &str = "config.toml";

fn set_table_value_preserving_decor(table: &mut Table, key: &str, item: Item) {
    let existing_value_decor = table
        .get(key)
        .and_then(|current| current.as_value().map(|value| value.decor().clone()));
    table[key] = item;
    if let Some(existing_value_decor) = existing_value_decor {
        if let Some(next_value) = table[key].as_value_mut() {
            *next_value.decor_mut() = existing_value_decor;
        }
    }
}

fn set_table_value_if_changed<T, F>(
    table: &mut Table,
    key: &str,
    previous_value: T,
    next_value: T,
    to_item: F,
) where
    T: PartialEq,
    F: FnOnce(T) -> Item,
{
    if table.contains_key(key) && previous_value == next_value {
        return;
    }
    set_table_value_preserving_decor(table, key, to_item(next_value));
}

fn ensure_section_table<'a>(document: &'a mut DocumentMut, key: &str) -> &'a mut Table {
    let root = document.as_table_mut();
    let should_replace = !matches!(root.get(key), Some(item) if item.is_table());
    if should_replace {
        root.insert(key, Item::Table(Table::new()));
    }
    root[key]
        .as_table_mut()
        .unwrap_or_else(|| unreachable!("section {key} was just inserted as a table"))
}

fn server_type_label(server_type: ServerType) -> &'static str {
    match server_type {
        ServerType::Emby => "emby",
        ServerType::Plex => "plex",
    }
}

fn feed_type_label(feed_type: FeedType) -> &'static str {
    match feed_type {
        FeedType::Latest => "latest",
        FeedType::Random => "random",
        FeedType::Favorites => "favorites",
    }
}

fn string_array(values: &[String]) -> Item {
    let mut array = Array::new();
    for entry in values {
        array.push(entry.as_str());
    }
    value(array)
}

fn write_config_to_document(document: &mut DocumentMut, previous: &Config, config: &Config) {
    {
        let server = ensure_section_table(document, "server");
        set_table_value_if_changed(
            server,
            "url",
            previous.server.url.as_str(),
            config.server.url.as_str(),
            value,
        );
        set_table_value_if_changed(
            server,
            "username",
            previous.server.username.as_str(),
            config.server.username.as_str(),
            value,
        );
        set_table_value_if_changed(
            server,
            "server_type",
            server_type_label(previous.server.server_type),
            server_type_label(config.server.server_type),
            value,
        );
    }

    {
        let client = ensure_section_table(document, "client");
        set_table_value_if_changed(
            client,
            "device_name",
            previous.client.device_name.as_str(),
            config.client.device_name.as_str(),
            value,
        );
        set_table_value_if_changed(
            client,
            "request_timeout_secs",
            i64::try_from(previous.client.request_timeout_secs).unwrap_or(i64::MAX),
            i64::try_from(config.client.request_timeout_secs).unwrap_or(i64::MAX),
            value,
        );
    }

    {
        let feed = ensure_section_table(document, "feed");
        set_table_value_if_changed(
            feed,
            "page_size",
            i64::try_from(previous.feed.page_size).unwrap_or(i64::MAX),
            i64::try_from(config.feed.page_size).unwrap_or(i64::MAX),
            value,
        );
        set_table_value_if_changed(
            feed,
            "catalog_batch_size",
            i64::try_from(previous.feed.catalog_batch_size).unwrap_or(i64::MAX),
            i64::try_from(config.feed.catalog_batch_size).unwrap_or(i64::MAX),
            value,
        );
        set_table_value_if_changed(
            feed,
            "default_feed_type",
            feed_type_label(previous.feed.default_feed_type),
            feed_type_label(config.feed.default_feed_type),
            value,
        );
        set_table_value_if_changed(
            feed,
            "favorites_scope_name",
            previous.feed.favorites_scope_name.as_str(),
            config.feed.favorites_scope_name.as_str(),
            value,
        );
    }

    {
        let libraries = ensure_section_table(document, "libraries");
        set_table_value_if_changed(
            libraries,
            "hidden",
            previous.libraries.hidden.as_slice(),
            config.libraries.hidden.as_slice(),
            string_array,
        );
    }
}

/// Rewrites only the keys whose values changed, keeping comments and layout.
pub fn serialize_config_with_preserved_comments(
    existing_text: &str,
    config: &Config,
) -> Result<String, String> {
    let previous = toml::from_str::<Config>(existing_text)
        .map_err(|err| format!("failed to parse existing config as Config: {}", err))?;
    let mut document = existing_text
        .parse::<DocumentMut>()
        .map_err(|err| format!("failed to parse existing config as TOML document: {}", err))?;
    write_config_to_document(&mut document, &previous, config);
    Ok(document.to_string())
}

pub fn persist_config_file(config: &Config, path: &Path) {
    let existing_text = std::fs::read_to_string(path).ok();
    let config_text = if let Some(existing_text) = existing_text {
        match serialize_config_with_preserved_comments(&existing_text, config) {
            Ok(updated_text) => Some(updated_text),
            Err(err) => {
                warn!(
                    "Failed to preserve config comments for {} ({}). Falling back to plain serialization.",
                    path.display(),
                    err
                );
                toml::to_string(config).ok()
            }
        }
    } else {
        toml::to_string(config).ok()
    };

    let Some(config_text) = config_text else {
        log::error!("Failed to serialize config for {}", path.display());
        return;
    };

    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            log::error!(
                "Failed to create config directory {}: {}",
                parent.display(),
                err
            );
            return;
        }
    }

    if let Err(err) = std::fs::write(path, config_text) {
        log::error!("Failed to persist config to {}: {}", path.display(), err);
    }
}

/// Location of `config.toml` under the platform config directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

/// Parses config text, falling back to defaults for malformed files.
pub fn parse_config_text(text: &str) -> Config {
    match toml::from_str::<Config>(text) {
        Ok(config) => sanitize_config(config),
        Err(err) => {
            warn!("Config file is malformed ({}). Using defaults.", err);
            Config::default()
        }
    }
}

/// Loads the config file, writing a default one first if it does not exist.
pub fn load_config_file(path: &Path) -> Config {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        let default_config = Config::default();
        persist_config_file(&default_config, path);
        return default_config;
    }

    match std::fs::read_to_string(path) {
        Ok(text) => parse_config_text(&text),
        Err(err) => {
            warn!(
                "Failed to read config {} ({}). Using defaults.",
                path.display(),
                err
            );
            Config::default()
        }
    }
}
