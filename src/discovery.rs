//! Discovery orchestration: crawl courses, list channel videos, persist one manifest

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::crawler::{HttpPageFetcher, SiteCrawler};
use crate::error::Result;
use crate::playlists::ChannelCatalog;
use crate::resource::{keys, Resource};
use crate::sources::DiscoverySources;
use crate::storage::StorageManager;
use crate::youtube::YouTubeClient;

/// Outcome of a discovery run
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub resources: Vec<Resource>,
    /// Key of the persisted manifest, `None` when nothing was found
    pub manifest_key: Option<String>,
}

pub struct Discoverer {
    crawler: SiteCrawler,
    catalog: Option<ChannelCatalog>,
    storage: StorageManager,
    manifest_prefix: String,
}

impl Discoverer {
    /// `catalog` is `None` when no video provider is configured
    pub fn new(
        crawler: SiteCrawler,
        catalog: Option<ChannelCatalog>,
        storage: StorageManager,
        manifest_prefix: impl Into<String>,
    ) -> Self {
        Self {
            crawler,
            catalog,
            storage,
            manifest_prefix: manifest_prefix.into(),
        }
    }

    /// Wire up the HTTP crawler and, when an API key is set, the YouTube client
    pub fn from_config(config: &Config, storage: StorageManager) -> Result<Self> {
        let fetcher = Arc::new(HttpPageFetcher::new(&config.crawler)?);
        let crawler = SiteCrawler::new(fetcher, &config.crawler)?;

        let catalog = match config.youtube.api_key.as_deref() {
            Some(key) if !key.is_empty() => {
                let client = YouTubeClient::new(&config.youtube)?;
                Some(ChannelCatalog::new(
                    Arc::new(client),
                    config.youtube.max_videos_per_playlist,
                ))
            }
            _ => None,
        };

        Ok(Self::new(
            crawler,
            catalog,
            storage,
            config.discovery.manifest_prefix.clone(),
        ))
    }

    /// Run every course and channel in `sources`; failures stay within their branch
    pub async fn discover(&self, sources: &DiscoverySources) -> Result<DiscoveryReport> {
        let mut resources = Vec::new();

        for course in &sources.ocw_courses {
            match self.crawler.crawl_course(course).await {
                Ok(crawl) => resources.extend(crawl.resources),
                Err(e) => error!("❌ Course {} skipped: {}", course, e),
            }
        }

        match &self.catalog {
            Some(catalog) => {
                for (handle, desired) in &sources.youtube_playlists {
                    match catalog.discover_channel_videos(handle, desired).await {
                        Ok(videos) => {
                            info!("📺 {} videos from {}", videos.len(), handle);
                            resources.extend(videos);
                        }
                        Err(e) if e.is_not_found() => warn!("⚠️ Channel {} not found: {}", handle, e),
                        Err(e) => error!("❌ Channel {} skipped: {}", handle, e),
                    }
                }
            }
            None if !sources.youtube_playlists.is_empty() => {
                info!("No YouTube API key configured, skipping video discovery");
            }
            None => {}
        }

        let manifest_key = self.persist(&resources).await?;
        Ok(DiscoveryReport {
            resources,
            manifest_key,
        })
    }

    /// Write the manifest unless there is nothing to write
    async fn persist(&self, resources: &[Resource]) -> Result<Option<String>> {
        if resources.is_empty() {
            info!("No resources discovered, nothing written");
            return Ok(None);
        }

        let key = keys::discovery_manifest(&self.manifest_prefix, Utc::now());
        self.storage.put_json(&key, resources).await?;
        info!(
            "💾 Uploaded {} resources to {}",
            resources.len(),
            self.storage.uri(&key)
        );

        Ok(Some(key))
    }
}
