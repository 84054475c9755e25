//! Client error taxonomy shared by backend adapters and the feed coordinator.

use thiserror::Error;

/// Failure surfaced by a media-server call.
///
/// `Auth` is terminal for a login attempt. `Fetch` covers every listing,
/// paging, and playlist call after login, including payloads that do not match
/// the expected schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Request failed: {0}")]
    Fetch(String),
}

impl ClientError {
    /// Maps a `ureq` failure on a post-login call into a fetch error.
    pub fn fetch(action: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) => {
                Self::Fetch(format!("{action} returned HTTP status {code}"))
            }
            ureq::Error::Transport(transport) => Self::Fetch(format!("{action}: {transport}")),
        }
    }

    /// Maps a body decode failure on a post-login call into a fetch error.
    pub fn decode(action: &str, err: std::io::Error) -> Self {
        Self::Fetch(format!("{action} response parse failed: {err}"))
    }

    /// Maps any failure during the login exchange into an auth error.
    pub fn auth(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) => Self::Auth(format!("server returned HTTP status {code}")),
            ureq::Error::Transport(transport) => Self::Auth(transport.to_string()),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}
