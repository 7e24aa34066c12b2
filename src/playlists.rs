//! Channel resolution, playlist enumeration and matching, video listing

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{HarvestError, Result};
use crate::resource::Resource;
use crate::youtube::{PlaylistSummary, PlaylistVideo, VideoProvider};

/// Largest page the provider serves in one request
pub const MAX_PAGE_SIZE: u32 = 50;

/// Lists the lecture videos of a channel's matching playlists
pub struct ChannelCatalog {
    provider: Arc<dyn VideoProvider>,
    max_videos_per_playlist: u32,
}

impl ChannelCatalog {
    pub fn new(provider: Arc<dyn VideoProvider>, max_videos_per_playlist: u32) -> Self {
        Self {
            provider,
            max_videos_per_playlist,
        }
    }

    /// Resolve `@handle` (or `handle`) to a channel id
    pub async fn resolve_channel_id(&self, handle: &str) -> Result<String> {
        let handle = handle.strip_prefix('@').unwrap_or(handle);

        self.provider
            .channel_ids_for_handle(handle)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| HarvestError::NotFound(format!("channel for handle @{}", handle)))
    }

    /// Every playlist of a channel, following continuation tokens
    pub async fn list_all_playlists(&self, channel_id: &str, page_size: u32) -> Result<Vec<PlaylistSummary>> {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let mut playlists = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .provider
                .playlists_page(channel_id, page_size, page_token.as_deref())
                .await?;
            playlists.extend(page.playlists);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Channel {} has {} playlists", channel_id, playlists.len());
        Ok(playlists)
    }

    /// First `max_results` videos of a playlist, in one request; none for a zero cap
    pub async fn fetch_playlist_videos(&self, playlist_id: &str, max_results: u32) -> Result<Vec<PlaylistVideo>> {
        if max_results == 0 {
            return Ok(Vec::new());
        }
        self.provider
            .playlist_items(playlist_id, max_results.min(MAX_PAGE_SIZE))
            .await
    }

    /// Resolve, enumerate, match and list: video resources for one channel
    pub async fn discover_channel_videos(&self, handle: &str, desired: &[String]) -> Result<Vec<Resource>> {
        let channel_id = self.resolve_channel_id(handle).await?;
        info!("📺 Resolved {} to channel {}", handle, channel_id);

        let playlists = self.list_all_playlists(&channel_id, MAX_PAGE_SIZE).await?;
        let matched = match_playlists(&playlists, desired);

        if matched.is_empty() {
            warn!("⚠️ No playlists on {} match {:?}", handle, desired);
            return Ok(Vec::new());
        }

        let mut resources = Vec::new();
        for playlist in matched {
            let videos = self
                .fetch_playlist_videos(&playlist.id, self.max_videos_per_playlist)
                .await?;
            info!("🎬 {} videos from playlist '{}'", videos.len(), playlist.title);

            resources.extend(videos.into_iter().map(|video| {
                Resource::video(&video.video_id, video.title, handle, &playlist.title, video.published_at)
            }));
        }

        Ok(resources)
    }
}

/// Playlists whose title contains any desired substring, case-insensitively.
///
/// A substring may select several playlists and a playlist may be selected by
/// several substrings; each playlist appears once, in first-selection order.
pub fn match_playlists<'a>(playlists: &'a [PlaylistSummary], desired: &[String]) -> Vec<&'a PlaylistSummary> {
    let mut seen = HashSet::new();
    let mut matched = Vec::new();

    for needle in desired {
        let needle = needle.to_lowercase();
        for playlist in playlists {
            if playlist.title.to_lowercase().contains(&needle) && seen.insert(playlist.id.as_str()) {
                matched.push(playlist);
            }
        }
    }

    matched
}
