//! Chooses the backend implementation for a configured server type.

use std::sync::Arc;
use std::time::Duration;

use crate::backends::emby::EmbyAdapter;
use crate::backends::plex::PlexAdapter;
use crate::config::{Config, ServerType};
use crate::error::ClientError;
use crate::identity::ClientIdentity;
use crate::media_client::{MediaClient, TokClient};
use crate::models::normalize_server_url;

fn validate_login(config: &Config, password: &str) -> Result<String, ClientError> {
    let server_url = normalize_server_url(&config.server.url);
    if server_url.is_empty() {
        return Err(ClientError::Auth("server url is required".to_string()));
    }
    if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
        return Err(ClientError::Auth(format!(
            "server url must start with http:// or https://: {server_url}"
        )));
    }
    if config.server.username.trim().is_empty() {
        return Err(ClientError::Auth("username is required".to_string()));
    }
    if password.is_empty() && config.server.server_type == ServerType::Plex {
        return Err(ClientError::Auth("password is required".to_string()));
    }
    Ok(server_url)
}

/// Signs in against the configured server and returns its client.
pub fn connect(
    config: &Config,
    identity: &ClientIdentity,
    password: &str,
) -> Result<Arc<dyn MediaClient>, ClientError> {
    let server_url = validate_login(config, password)?;
    let timeout = Duration::from_secs(config.client.request_timeout_secs);
    let username = config.server.username.trim();
    let client: Arc<dyn MediaClient> = match config.server.server_type {
        ServerType::Emby => Arc::new(TokClient::login(
            EmbyAdapter::new(identity.clone(), timeout),
            ServerType::Emby,
            &server_url,
            username,
            password,
            &config.feed,
        )?),
        ServerType::Plex => Arc::new(TokClient::login(
            PlexAdapter::new(identity.clone(), timeout),
            ServerType::Plex,
            &server_url,
            username,
            password,
            &config.feed,
        )?),
    };
    Ok(client)
}
