//! Video provider abstraction and the YouTube Data API client

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::YouTubeConfig;
use crate::error::{HarvestError, Result};

/// A playlist owned by a channel
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistSummary {
    pub id: String,
    pub title: String,
}

/// One page of a channel's playlists
#[derive(Debug, Clone, Default)]
pub struct PlaylistPage {
    pub playlists: Vec<PlaylistSummary>,
    pub next_page_token: Option<String>,
}

/// A video entry in a playlist
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistVideo {
    pub video_id: String,
    pub title: String,
    pub published_at: Option<String>,
}

/// Read-only access to a video platform's channel and playlist catalogue
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Channel ids matching a handle (without the leading `@`)
    async fn channel_ids_for_handle(&self, handle: &str) -> Result<Vec<String>>;

    async fn playlists_page(
        &self,
        channel_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<PlaylistPage>;

    /// First `max_results` items of a playlist
    async fn playlist_items(&self, playlist_id: &str, max_results: u32) -> Result<Vec<PlaylistVideo>>;
}

/// YouTube Data API v3 client
pub struct YouTubeClient {
    api_key: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistListResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    id: String,
    #[serde(default)]
    snippet: PlaylistSnippet,
}

#[derive(Debug, Default, Deserialize)]
struct PlaylistSnippet {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemListResponse {
    #[serde(default)]
    items: Vec<PlaylistEntry>,
}

#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    #[serde(default)]
    snippet: PlaylistEntrySnippet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistEntrySnippet {
    #[serde(default)]
    title: String,
    published_at: Option<String>,
    resource_id: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

impl From<PlaylistListResponse> for PlaylistPage {
    fn from(response: PlaylistListResponse) -> Self {
        Self {
            playlists: response
                .items
                .into_iter()
                .map(|item| PlaylistSummary {
                    id: item.id,
                    title: item.snippet.title,
                })
                .collect(),
            next_page_token: response.next_page_token.filter(|token| !token.is_empty()),
        }
    }
}

impl PlaylistItemListResponse {
    /// Entries without a video id (removed or private videos) are dropped
    fn into_videos(self) -> Vec<PlaylistVideo> {
        self.items
            .into_iter()
            .filter_map(|entry| {
                let video_id = entry.snippet.resource_id?.video_id?;
                Some(PlaylistVideo {
                    video_id,
                    title: entry.snippet.title,
                    published_at: entry.snippet.published_at,
                })
            })
            .collect()
    }
}

impl YouTubeClient {
    pub fn new(config: &YouTubeConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| HarvestError::Config("YouTube API key not configured".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            api_key,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, resource: &str, params: &[(&str, &str)]) -> Result<T> {
        let endpoint = format!("{}/{}", self.base_url, resource);
        debug!("Requesting {} with {:?}", endpoint, params);

        let response = self
            .client
            .get(&endpoint)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(HarvestError::Api(format!("{} returned {}: {}", resource, status, text)));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl VideoProvider for YouTubeClient {
    async fn channel_ids_for_handle(&self, handle: &str) -> Result<Vec<String>> {
        let response: ChannelListResponse = self
            .get_json("channels", &[("part", "id"), ("forHandle", handle), ("maxResults", "1")])
            .await?;

        Ok(response.items.into_iter().map(|item| item.id).collect())
    }

    async fn playlists_page(
        &self,
        channel_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<PlaylistPage> {
        let page_size = page_size.to_string();
        let mut params = vec![
            ("part", "snippet"),
            ("channelId", channel_id),
            ("maxResults", page_size.as_str()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let response: PlaylistListResponse = self.get_json("playlists", &params).await?;
        Ok(response.into())
    }

    async fn playlist_items(&self, playlist_id: &str, max_results: u32) -> Result<Vec<PlaylistVideo>> {
        let max_results = max_results.to_string();
        let response: PlaylistItemListResponse = self
            .get_json(
                "playlistItems",
                &[
                    ("part", "snippet"),
                    ("playlistId", playlist_id),
                    ("maxResults", max_results.as_str()),
                ],
            )
            .await?;

        Ok(response.into_videos())
    }
}
