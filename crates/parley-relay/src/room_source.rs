//! Room configuration fetched from the room-config collaborator over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use parley_social::{RoomConfig, RoomSource};

/// `GET {base_url}/api/rooms/{id}` returning a JSON [`RoomConfig`].
///
/// An empty base URL means no collaborator: every room uses defaults.
pub struct HttpRoomSource {
    base_url: String,
    http: reqwest::Client,
}

impl HttpRoomSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url_for(&self, room_id: &str) -> String {
        format!("{}/api/rooms/{}", self.base_url, room_id)
    }
}

#[async_trait]
impl RoomSource for HttpRoomSource {
    async fn fetch(&self, room_id: &str) -> Result<RoomConfig, String> {
        if self.base_url.is_empty() {
            return Ok(RoomConfig::default());
        }
        let url = self.url_for(room_id);
        tracing::debug!(url = %url, "Fetching room config");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("room config request returned {}", response.status()));
        }
        response
            .json::<RoomConfig>()
            .await
            .map_err(|e| e.to_string())
    }
}
