use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{HarvestError, Result};

/// Smallest part size S3 accepts for all but the last multipart chunk
const MIN_MULTIPART_CHUNK: usize = 5 * 1024 * 1024;

/// Runtime settings for the discovery and ingestion jobs
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Object storage backend and bucket
    pub storage: StorageConfig,

    /// Video provider API settings
    pub youtube: YouTubeConfig,

    /// Course site crawling settings
    pub crawler: CrawlerConfig,

    /// Discovery job settings
    pub discovery: DiscoveryConfig,

    /// Ingestion job settings
    pub ingestion: IngestionConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    S3,
    Local,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageKind,

    /// Target bucket (required for S3)
    pub bucket: Option<String>,

    /// Bucket region (required for S3)
    pub region: Option<String>,

    /// Custom S3-compatible endpoint
    pub endpoint: Option<String>,

    /// Root directory for the local backend
    pub local_root: PathBuf,

    pub connect_timeout_seconds: u64,

    pub read_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeConfig {
    /// API key; the video branch of discovery is skipped without one
    pub api_key: Option<String>,

    pub api_base_url: String,

    pub timeout_seconds: u64,

    /// Items fetched per matched playlist
    pub max_videos_per_playlist: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Scheme and host of the course site
    pub site_base_url: String,

    pub timeout_seconds: u64,

    /// Upper bound on pages fetched per course
    pub max_pages: usize,

    /// Link extensions treated as downloadable documents
    pub document_extensions: Vec<String>,

    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Sources document, local path or s3:// URI
    pub sources_file: String,

    pub manifest_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub audio_prefix: String,

    pub metadata_prefix: String,

    pub ytdlp_binary: PathBuf,

    /// yt-dlp format selector for audio downloads
    pub audio_format: String,

    pub multipart_chunk_size: usize,

    /// Multipart parts in flight at once
    pub max_concurrency: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageKind::S3,
            bucket: None,
            region: None,
            endpoint: None,
            local_root: PathBuf::from("./data"),
            connect_timeout_seconds: 60,
            read_timeout_seconds: 300,
        }
    }
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            timeout_seconds: 30,
            max_videos_per_playlist: 20,
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            site_base_url: "https://ocw.mit.edu".to_string(),
            timeout_seconds: 20,
            max_pages: 500,
            document_extensions: vec!["pdf".to_string()],
            user_agent: concat!("course-harvest/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            sources_file: "config.json".to_string(),
            manifest_prefix: "urls".to_string(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            audio_prefix: "audio/".to_string(),
            metadata_prefix: "metadata/ingestion".to_string(),
            ytdlp_binary: PathBuf::from("yt-dlp"),
            audio_format: "140/251/bestaudio/best".to_string(),
            multipart_chunk_size: 16 * 1024 * 1024,
            max_concurrency: 2,
        }
    }
}

impl Config {
    /// Load settings from `explicit` or the first default location found,
    /// then apply environment overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => Self::from_default_locations(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn from_default_locations() -> Self {
        let config_paths = ["course-harvest.toml", "config/course-harvest.toml"];

        for path in &config_paths {
            let path = Path::new(path);
            if !path.exists() {
                continue;
            }
            match Self::from_file(path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!("Skipping settings file {}: {}", path.display(), e),
            }
        }

        tracing::debug!("No settings file found, using defaults");
        Self::default()
    }

    /// Parse a TOML settings file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarvestError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = toml::from_str(&content).map_err(|e| {
            HarvestError::Config(format!("cannot parse {}: {}", path.display(), e))
        })?;
        tracing::info!("📄 Loaded settings from: {}", path.display());
        Ok(config)
    }

    /// Override settings from environment variables
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bucket) = lookup("S3_BUCKET") {
            self.storage.bucket = Some(bucket);
        }

        if let Some(region) = lookup("AWS_DEFAULT_REGION").or_else(|| lookup("AWS_REGION")) {
            self.storage.region = Some(region);
        }

        if let Some(endpoint) = lookup("AWS_ENDPOINT_URL") {
            self.storage.endpoint = Some(endpoint);
        }

        if let Some(backend) = lookup("STORAGE_BACKEND") {
            match backend.to_lowercase().as_str() {
                "s3" => self.storage.backend = StorageKind::S3,
                "local" => self.storage.backend = StorageKind::Local,
                "memory" => self.storage.backend = StorageKind::Memory,
                other => tracing::warn!("Ignoring unknown STORAGE_BACKEND: {}", other),
            }
        }

        if let Some(sources) = lookup("CONFIG_FILE") {
            self.discovery.sources_file = sources;
        }

        if let Some(api_key) = lookup("YOUTUBE_API_KEY").filter(|key| !key.is_empty()) {
            self.youtube.api_key = Some(api_key);
        }
    }

    /// Reject settings that would fail partway through a run
    pub fn validate(&self) -> Result<()> {
        if self.storage.backend == StorageKind::S3 {
            if self.storage.bucket.as_deref().map_or(true, str::is_empty) {
                return Err(HarvestError::Config("S3_BUCKET is required".into()));
            }
            if self.storage.region.as_deref().map_or(true, str::is_empty) {
                return Err(HarvestError::Config("AWS_DEFAULT_REGION is required".into()));
            }
        }

        if self.crawler.max_pages == 0 {
            return Err(HarvestError::Config("crawler.max_pages must be greater than 0".into()));
        }

        if self.youtube.max_videos_per_playlist == 0 {
            return Err(HarvestError::Config(
                "youtube.max_videos_per_playlist must be greater than 0".into(),
            ));
        }

        Url::parse(&self.crawler.site_base_url).map_err(|e| {
            HarvestError::Config(format!("invalid crawler.site_base_url: {}", e))
        })?;

        if self.ingestion.multipart_chunk_size < MIN_MULTIPART_CHUNK {
            return Err(HarvestError::Config(format!(
                "ingestion.multipart_chunk_size must be at least {} bytes",
                MIN_MULTIPART_CHUNK
            )));
        }

        if self.ingestion.max_concurrency == 0 {
            return Err(HarvestError::Config("ingestion.max_concurrency must be greater than 0".into()));
        }

        Ok(())
    }

    /// Bucket name used in log lines and URIs
    pub fn bucket_label(&self) -> &str {
        match self.storage.backend {
            StorageKind::S3 => self.storage.bucket.as_deref().unwrap_or("<unset>"),
            StorageKind::Local => "local",
            StorageKind::Memory => "memory",
        }
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Course Harvest Configuration:\n\
            - Storage: {:?} ({})\n\
            - Sources: {}\n\
            - Video API: {}\n\
            - Crawl Page Limit: {}\n\
            - Audio Prefix: {}",
            self.storage.backend,
            self.bucket_label(),
            self.discovery.sources_file,
            if self.youtube.api_key.is_some() { "enabled" } else { "disabled" },
            self.crawler.max_pages,
            self.ingestion.audio_prefix,
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_storage_backend(mut self, backend: StorageKind) -> Self {
        self.config.storage.backend = backend;
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.storage.bucket = Some(bucket.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.config.storage.region = Some(region.into());
        self
    }

    pub fn with_local_root(mut self, root: PathBuf) -> Self {
        self.config.storage.local_root = root;
        self
    }

    pub fn with_youtube_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.youtube.api_key = Some(api_key.into());
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.config.crawler.max_pages = max_pages;
        self
    }

    pub fn with_site_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.crawler.site_base_url = url.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.backend, StorageKind::S3);
        assert_eq!(config.crawler.site_base_url, "https://ocw.mit.edu");
        assert_eq!(config.youtube.max_videos_per_playlist, 20);
        assert_eq!(config.ingestion.multipart_chunk_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_bucket("edu-data")
            .with_region("us-east-1")
            .with_max_pages(10)
            .build();

        assert_eq!(config.storage.bucket.as_deref(), Some("edu-data"));
        assert_eq!(config.crawler.max_pages, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_bucket_is_config_error() {
        let config = ConfigBuilder::new().with_region("us-east-1").build();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }

    #[test]
    fn test_memory_backend_needs_no_bucket() {
        let config = ConfigBuilder::new()
            .with_storage_backend(StorageKind::Memory)
            .build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_page_limit_rejected() {
        let config = ConfigBuilder::new()
            .with_storage_backend(StorageKind::Memory)
            .with_max_pages(0)
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_playlist_video_cap_rejected() {
        let mut config = ConfigBuilder::new()
            .with_storage_backend(StorageKind::Memory)
            .build();
        config.youtube.max_videos_per_playlist = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_videos_per_playlist"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("S3_BUCKET", "multimodal-llm-edu-data"),
            ("AWS_DEFAULT_REGION", "eu-west-1"),
            ("CONFIG_FILE", "s3://multimodal-llm-edu-data/config.json"),
            ("YOUTUBE_API_KEY", "secret"),
            ("STORAGE_BACKEND", "Local"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.storage.bucket.as_deref(), Some("multimodal-llm-edu-data"));
        assert_eq!(config.storage.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.storage.backend, StorageKind::Local);
        assert_eq!(config.discovery.sources_file, "s3://multimodal-llm-edu-data/config.json");
        assert_eq!(config.youtube.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            backend = "local"
            local_root = "/tmp/harvest"

            [crawler]
            max_pages = 25
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, StorageKind::Local);
        assert_eq!(config.crawler.max_pages, 25);
        assert_eq!(config.crawler.timeout_seconds, 20);
        assert_eq!(config.ingestion.audio_prefix, "audio/");
    }
}
