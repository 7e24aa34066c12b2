//! Object storage access for manifests, job records and media artifacts.
//!
//! Wraps an `object_store` backend (S3, local filesystem or in-memory) bound to
//! a single bucket. Large files go through multipart uploads and downloads are
//! streamed to disk, so memory stays bounded by the part size.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjPath;
use object_store::{
    Attribute, Attributes, ClientOptions, ObjectMeta, ObjectStore, PutOptions, PutPayload,
    RetryConfig, WriteMultipart,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::config::{IngestionConfig, StorageConfig, StorageKind};
use crate::error::{HarvestError, Result};

pub type DynStore = Arc<dyn ObjectStore>;

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Multipart transfer tuning for large uploads
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    pub chunk_size: usize,
    pub max_concurrency: usize,
}

impl From<&IngestionConfig> for TransferOptions {
    fn from(cfg: &IngestionConfig) -> Self {
        Self {
            chunk_size: cfg.multipart_chunk_size,
            max_concurrency: cfg.max_concurrency,
        }
    }
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self::from(&IngestionConfig::default())
    }
}

/// An `s3://bucket/key` location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUri {
    pub bucket: String,
    pub key: String,
}

impl ObjectUri {
    pub fn parse(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("s3://")?;
        let (bucket, key) = rest.split_once('/')?;
        if bucket.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

/// Storage handle bound to one bucket
#[derive(Clone)]
pub struct StorageManager {
    store: DynStore,
    backend_kind: StorageKind,
    bucket: String,
    settings: Option<StorageConfig>,
}

impl StorageManager {
    /// Create the backend described by `cfg`
    pub async fn new(cfg: &StorageConfig) -> Result<Self> {
        let (store, bucket): (DynStore, String) = match cfg.backend {
            StorageKind::S3 => {
                let bucket = cfg
                    .bucket
                    .clone()
                    .ok_or_else(|| HarvestError::Config("S3_BUCKET is required".into()))?;
                (Arc::new(build_s3(cfg, &bucket)?), bucket)
            }
            StorageKind::Local => {
                tokio::fs::create_dir_all(&cfg.local_root).await?;
                let store = LocalFileSystem::new_with_prefix(&cfg.local_root)?;
                (Arc::new(store), "local".to_string())
            }
            StorageKind::Memory => (Arc::new(InMemory::new()), "memory".to_string()),
        };

        Ok(Self {
            store,
            backend_kind: cfg.backend,
            bucket,
            settings: Some(cfg.clone()),
        })
    }

    /// Wrap an existing backend, mostly for tests
    pub fn with_backend(store: DynStore, backend_kind: StorageKind, bucket: impl Into<String>) -> Self {
        Self {
            store,
            backend_kind,
            bucket: bucket.into(),
            settings: None,
        }
    }

    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(InMemory::new()), StorageKind::Memory, "memory")
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn backend_kind(&self) -> StorageKind {
        self.backend_kind
    }

    /// Human-readable location of `key`
    pub fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    /// Handle for another bucket with the same credentials and region.
    ///
    /// Local and in-memory backends have a single namespace, so they return
    /// themselves regardless of `bucket`.
    pub fn for_bucket(&self, bucket: &str) -> Result<Self> {
        if bucket == self.bucket || self.backend_kind != StorageKind::S3 {
            return Ok(self.clone());
        }

        let settings = self.settings.as_ref().ok_or_else(|| {
            HarvestError::Config(format!("no S3 settings to open bucket {}", bucket))
        })?;

        Ok(Self {
            store: Arc::new(build_s3(settings, bucket)?),
            backend_kind: StorageKind::S3,
            bucket: bucket.to_string(),
            settings: Some(settings.clone()),
        })
    }

    /// Store bytes at `key` with the given content type
    pub async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        let path = ObjPath::from(key);
        let mut attributes = Attributes::new();
        // The local backend rejects object attributes
        if self.backend_kind != StorageKind::Local {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&path, PutPayload::from_bytes(data), opts)
            .await
            .map_err(|e| HarvestError::Upload(format!("{}: {}", self.uri(key), e)))?;
        Ok(())
    }

    /// Serialize `value` as pretty JSON and store it at `key`
    pub async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let body = serde_json::to_vec_pretty(value)?;
        self.put(key, Bytes::from(body), "application/json").await
    }

    /// Retrieve the full contents of `key`
    pub async fn get(&self, key: &str) -> Result<Bytes> {
        let path = ObjPath::from(key);
        let result = self.store.get(&path).await?;
        Ok(result.bytes().await?)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let body = self.get(key).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// List all objects below `prefix`; continuation is handled by the backend stream
    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectMeta>> {
        let prefix_path = prefix.map(ObjPath::from);
        Ok(self
            .store
            .list(prefix_path.as_ref())
            .try_collect::<Vec<_>>()
            .await?)
    }

    /// Check if an object exists at `key`
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = ObjPath::from(key);
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Stream `key` into `local_path`, returning the number of bytes written
    pub async fn download(&self, key: &str, local_path: &Path) -> Result<u64> {
        let path = ObjPath::from(key);
        let mut stream = self.store.get(&path).await?.into_stream();

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(local_path).await?;
        let mut written = 0u64;

        while let Some(chunk) = stream.try_next().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!("Downloaded {} ({} bytes) to {}", self.uri(key), written, local_path.display());
        Ok(written)
    }

    /// Upload a local file with a multipart transfer, returning the bytes sent
    pub async fn upload_file(&self, local_path: &Path, key: &str, options: &TransferOptions) -> Result<u64> {
        info!("⬆️ Uploading {} -> {}", local_path.display(), self.uri(key));

        let mut file = tokio::fs::File::open(local_path).await?;
        let upload = self
            .store
            .put_multipart(&ObjPath::from(key))
            .await
            .map_err(|e| HarvestError::Upload(format!("{}: {}", self.uri(key), e)))?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, options.chunk_size);

        match copy_into(&mut file, &mut writer, options.max_concurrency).await {
            Ok(total) => {
                writer
                    .finish()
                    .await
                    .map_err(|e| HarvestError::Upload(format!("{}: {}", self.uri(key), e)))?;
                info!("✅ Uploaded {} ({} bytes)", self.uri(key), total);
                Ok(total)
            }
            Err(e) => {
                if let Err(abort_err) = writer.abort().await {
                    warn!("Failed to abort multipart upload for {}: {}", key, abort_err);
                }
                Err(HarvestError::Upload(format!("{}: {}", self.uri(key), e)))
            }
        }
    }

    /// Read `source` from an `s3://` URI, a local file, or a key in this bucket
    pub async fn read_source(&self, source: &str) -> Result<Bytes> {
        if let Some(uri) = ObjectUri::parse(source) {
            info!("📥 Loading {}", source);
            return self.for_bucket(&uri.bucket)?.get(&uri.key).await;
        }

        let local = Path::new(source);
        if local.exists() {
            info!("📥 Loading {}", local.display());
            return Ok(Bytes::from(tokio::fs::read(local).await?));
        }

        info!("📥 Loading {}", self.uri(source));
        self.get(source).await
    }
}

async fn copy_into(
    file: &mut tokio::fs::File,
    writer: &mut WriteMultipart,
    max_concurrency: usize,
) -> Result<u64> {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        writer.wait_for_capacity(max_concurrency).await?;
        writer.write(&buffer[..read]);
        total += read as u64;
    }

    Ok(total)
}

fn build_s3(cfg: &StorageConfig, bucket: &str) -> Result<object_store::aws::AmazonS3> {
    let region = cfg
        .region
        .clone()
        .ok_or_else(|| HarvestError::Config("AWS_DEFAULT_REGION is required".into()))?;

    let client_options = ClientOptions::new()
        .with_connect_timeout(Duration::from_secs(cfg.connect_timeout_seconds))
        .with_timeout(Duration::from_secs(cfg.read_timeout_seconds));

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_region(region)
        .with_client_options(client_options)
        .with_retry(RetryConfig {
            max_retries: 5,
            ..Default::default()
        });

    if let Some(endpoint) = &cfg.endpoint {
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(endpoint.starts_with("http://"));
    }

    Ok(builder.build()?)
}
