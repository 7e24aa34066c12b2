/// Course Harvest
///
/// Discovers lecture material for open courseware (course-site documents and
/// channel playlist videos) and ingests it into object storage: audio tracks,
/// chapter markers and a job record per run.

pub mod classify;
pub mod config;
pub mod crawler;
pub mod discovery;
pub mod error;
pub mod ingestion;
pub mod media;
pub mod playlists;
pub mod resource;
pub mod sources;
pub mod storage;
pub mod youtube;

// Re-export main types for easy access
pub use crate::classify::classify_link;
pub use crate::config::{Config, ConfigBuilder, StorageKind};
pub use crate::crawler::{CrawlResult, HttpPageFetcher, PageFetcher, SiteCrawler};
pub use crate::discovery::{Discoverer, DiscoveryReport};
pub use crate::error::{HarvestError, Result};
pub use crate::ingestion::{IngestionOutcome, Ingestor, JobState};
pub use crate::media::{AcquiredAudio, Chapter, MediaAcquirer, YtDlpAcquirer};
pub use crate::playlists::{match_playlists, ChannelCatalog};
pub use crate::resource::{IngestionJob, IngestionRecord, IngestionStatus, Resource, ResourceSubtype, ResourceType};
pub use crate::sources::DiscoverySources;
pub use crate::storage::{StorageManager, TransferOptions};
pub use crate::youtube::{PlaylistSummary, PlaylistVideo, VideoProvider, YouTubeClient};
