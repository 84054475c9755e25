//! Process-wide client identity attached to every server request.

use uuid::Uuid;

pub const CLIENT_NAME: &str = "EmbyTok";
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed client/device naming plus a device id generated once per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub client_name: String,
    pub device_name: String,
    pub device_id: String,
    pub version: String,
}

impl ClientIdentity {
    /// Builds the identity for this process with a fresh random device id.
    pub fn for_process(device_name: &str) -> Self {
        Self::with_device_id(
            device_name,
            &format!("embytok-{}", Uuid::new_v4().simple()),
        )
    }

    pub fn with_device_id(device_name: &str, device_id: &str) -> Self {
        Self {
            client_name: CLIENT_NAME.to_string(),
            device_name: device_name.to_string(),
            device_id: device_id.to_string(),
            version: CLIENT_VERSION.to_string(),
        }
    }

    /// Value for the `X-Emby-Authorization` header.
    pub fn emby_authorization(&self, token: Option<&str>) -> String {
        let mut header = format!(
            "MediaBrowser Client=\"{}\", Device=\"{}\", DeviceId=\"{}\", Version=\"{}\"",
            self.client_name, self.device_name, self.device_id, self.version
        );
        if let Some(token) = token.filter(|token| !token.is_empty()) {
            header.push_str(&format!(", Token=\"{token}\""));
        }
        header
    }

    /// `X-Plex-*` identification headers, with the token when authenticated.
    pub fn plex_headers(&self, token: Option<&str>) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-Plex-Product", self.client_name.clone()),
            ("X-Plex-Version", self.version.clone()),
            ("X-Plex-Client-Identifier", self.device_id.clone()),
            ("X-Plex-Device-Name", self.device_name.clone()),
            ("Accept", "application/json".to_string()),
        ];
        if let Some(token) = token.filter(|token| !token.is_empty()) {
            headers.push(("X-Plex-Token", token.to_string()));
        }
        headers
    }
}
