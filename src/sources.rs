use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::error::Result;
use crate::storage::StorageManager;

/// What to discover: course ids to crawl and, per channel handle,
/// the playlist-title substrings to select
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiscoverySources {
    #[serde(default)]
    pub ocw_courses: Vec<String>,

    #[serde(default)]
    pub youtube_playlists: BTreeMap<String, Vec<String>>,
}

impl DiscoverySources {
    /// Load from a local path, an `s3://` URI, or a key in the configured bucket
    pub async fn load(storage: &StorageManager, source: &str) -> Result<Self> {
        let body = storage.read_source(source).await?;
        let sources = Self::from_slice(&body)?;
        info!(
            "🗂️ Sources: {} courses, {} channels",
            sources.ocw_courses.len(),
            sources.youtube_playlists.len()
        );
        Ok(sources)
    }

    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn is_empty(&self) -> bool {
        self.ocw_courses.is_empty() && self.youtube_playlists.is_empty()
    }
}
