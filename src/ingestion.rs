//! Ingestion orchestration: turn a discovery manifest into stored audio,
//! chapter files and one persisted job record.
//!
//! Items are processed one at a time. A failing item is recorded as `failed`
//! with its error text and never stops the run; there are no retries.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{HarvestError, Result};
use crate::media::{MediaAcquirer, YtDlpAcquirer};
use crate::resource::{keys, IngestionJob, IngestionRecord, IngestionStatus, Resource, ResourceType};
use crate::storage::{StorageManager, TransferOptions};

/// Selects the most recent discovery manifest instead of a named one
pub const LATEST_MANIFEST: &str = "latest";

pub const PDF_NOT_IMPLEMENTED: &str = "pdf ingestion not implemented";
pub const UNKNOWN_TYPE: &str = "unknown type";

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Started,
    Processing,
    Finalized,
}

/// Collects records for one job and derives the final counts
pub struct JobTracker {
    job_id: Uuid,
    started_at: DateTime<Utc>,
    state: JobState,
    records: Vec<IngestionRecord>,
}

impl JobTracker {
    pub fn start(expected: usize) -> Self {
        let job_id = Uuid::new_v4();
        info!("🚀 Ingestion job {} started with {} resources", job_id, expected);
        Self {
            job_id,
            started_at: Utc::now(),
            state: JobState::Started,
            records: Vec::with_capacity(expected),
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn record(&mut self, record: IngestionRecord) {
        if self.state == JobState::Started {
            debug!("Job {} processing", self.job_id);
            self.state = JobState::Processing;
        }
        self.records.push(record);
    }

    pub fn finalize(mut self) -> IngestionJob {
        self.state = JobState::Finalized;
        debug!("Job {} {:?}", self.job_id, self.state);
        IngestionJob::finalize(self.job_id, self.started_at, self.records)
    }
}

/// A finished job and where its record was stored
#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    pub job: IngestionJob,
    pub metadata_key: String,
}

pub struct Ingestor {
    storage: StorageManager,
    acquirer: Arc<dyn MediaAcquirer>,
    audio_prefix: String,
    metadata_prefix: String,
    manifest_prefix: String,
    transfer: TransferOptions,
}

impl Ingestor {
    pub fn new(storage: StorageManager, acquirer: Arc<dyn MediaAcquirer>, config: &Config) -> Self {
        Self {
            storage,
            acquirer,
            audio_prefix: config.ingestion.audio_prefix.clone(),
            metadata_prefix: config.ingestion.metadata_prefix.clone(),
            manifest_prefix: config.discovery.manifest_prefix.clone(),
            transfer: TransferOptions::from(&config.ingestion),
        }
    }

    /// Ingestor backed by the yt-dlp binary named in `config`
    pub fn from_config(config: &Config, storage: StorageManager) -> Self {
        let acquirer = Arc::new(YtDlpAcquirer::from_config(&config.ingestion));
        Self::new(storage, acquirer, config)
    }

    /// Key of the newest discovery manifest; names embed their timestamp
    pub async fn latest_manifest_key(&self) -> Result<String> {
        self.storage
            .list(Some(self.manifest_prefix.as_str()))
            .await?
            .into_iter()
            .map(|meta| meta.location.to_string())
            .filter(|key| keys::is_discovery_manifest(key))
            .max()
            .ok_or_else(|| {
                HarvestError::NotFound(format!(
                    "no discovery manifest under {}",
                    self.storage.uri(&self.manifest_prefix)
                ))
            })
    }

    /// Read a manifest from a local path, `s3://` URI, bucket key, or `latest`.
    ///
    /// Only the top-level array is checked here; entries are decoded one by
    /// one during the run.
    pub async fn load_manifest(&self, source: &str) -> Result<Vec<Value>> {
        let source = if source == LATEST_MANIFEST {
            let key = self.latest_manifest_key().await?;
            info!("📄 Latest discovery manifest is {}", self.storage.uri(&key));
            key
        } else {
            source.to_string()
        };

        let body = self.storage.read_source(&source).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn run_from_source(&self, source: &str) -> Result<IngestionOutcome> {
        let entries = self.load_manifest(source).await?;
        self.run_entries(entries).await
    }

    /// Ingest raw manifest entries; an entry that does not decode is recorded `failed`
    pub async fn run_entries(&self, entries: Vec<Value>) -> Result<IngestionOutcome> {
        let mut tracker = JobTracker::start(entries.len());

        for entry in entries {
            let record = self.ingest_entry(entry).await;
            tracker.record(record);
        }

        self.complete(tracker).await
    }

    /// Ingest every resource in order and persist the job record
    pub async fn run(&self, resources: Vec<Resource>) -> Result<IngestionOutcome> {
        let mut tracker = JobTracker::start(resources.len());

        for resource in resources {
            let record = self.ingest_resource(resource).await;
            tracker.record(record);
        }

        self.complete(tracker).await
    }

    async fn complete(&self, tracker: JobTracker) -> Result<IngestionOutcome> {
        let started_at = tracker.started_at();
        let job = tracker.finalize();
        let metadata_key = keys::ingestion_metadata(&self.metadata_prefix, started_at);
        self.storage.put_json(&metadata_key, &job).await?;
        info!("💾 Uploaded ingestion metadata to {}", self.storage.uri(&metadata_key));

        info!(
            "Ingestion job {} completed in {:.1}s: {} total, {} success, {} failed, {} skipped",
            job.job_id, job.duration_seconds, job.num_total, job.num_success, job.num_failed, job.num_skipped
        );

        Ok(IngestionOutcome { job, metadata_key })
    }

    pub async fn ingest_entry(&self, entry: Value) -> IngestionRecord {
        match Resource::deserialize(&entry) {
            Ok(resource) => self.ingest_resource(resource).await,
            Err(e) => {
                let reason = format!("invalid manifest entry: {}", e);
                let resource = Resource::unreadable(entry);
                error!("❌ Skipping manifest entry {}: {}", resource.url, reason);
                IngestionRecord::failed(resource, reason)
            }
        }
    }

    /// Outcome for one resource; errors become a `failed` record
    pub async fn ingest_resource(&self, resource: Resource) -> IngestionRecord {
        match resource.kind {
            ResourceType::Video => match self.ingest_video(&resource).await {
                Ok((audio_key, chapters_key)) => IngestionRecord::success(resource, audio_key, chapters_key),
                Err(e) => {
                    error!("❌ Failed to ingest {}: {}", resource.url, e);
                    IngestionRecord::failed(resource, e.to_string())
                }
            },
            ResourceType::Pdf => {
                debug!("Skipping document {}", resource.url);
                IngestionRecord::skipped(resource, PDF_NOT_IMPLEMENTED)
            }
            ResourceType::Other(_) => {
                warn!("⚠️ Skipping {} of unknown type {}", resource.url, resource.kind.as_str());
                IngestionRecord::skipped(resource, UNKNOWN_TYPE)
            }
        }
    }

    async fn ingest_video(&self, resource: &Resource) -> Result<(String, Option<String>)> {
        let work_dir = TempDir::new()?;
        let audio = self.acquirer.acquire_audio(&resource.url, work_dir.path()).await?;

        let audio_key = keys::audio(&self.audio_prefix, &audio.video_id, &audio.extension);
        self.storage
            .upload_file(&audio.path, &audio_key, &self.transfer)
            .await?;

        let chapters_key = if audio.chapters.is_empty() {
            None
        } else {
            let key = keys::chapters(&self.audio_prefix, &audio.video_id);
            self.storage.put_json(&key, &audio.chapters).await?;
            info!("📑 Uploaded {} chapters to {}", audio.chapters.len(), self.storage.uri(&key));
            Some(key)
        };

        Ok((audio_key, chapters_key))
    }
}

/// Status of each record, in manifest order
pub fn statuses(job: &IngestionJob) -> Vec<IngestionStatus> {
    job.resources.iter().map(|record| record.status).collect()
}
