//! Audio acquisition through yt-dlp
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::IngestionConfig;
use crate::error::{HarvestError, Result};
use crate::resource::video_id_from_url;

/// A chapter marker as reported by the video platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    #[serde(default)]
    pub title: String,
    pub start_time: f64,
    pub end_time: f64,
}

/// Audio track downloaded into a working directory
#[derive(Debug, Clone)]
pub struct AcquiredAudio {
    pub path: PathBuf,
    pub video_id: String,
    /// File extension without the dot
    pub extension: String,
    /// Empty when the video has no chapters
    pub chapters: Vec<Chapter>,
}

/// Fetches the audio of a video into a caller-owned directory
#[async_trait]
pub trait MediaAcquirer: Send + Sync {
    async fn acquire_audio(&self, video_url: &str, work_dir: &Path) -> Result<AcquiredAudio>;
}

/// Metadata subset of `yt-dlp --dump-single-json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    pub id: Option<String>,
    pub ext: Option<String>,
    #[serde(default)]
    pub chapters: Option<Vec<Chapter>>,
}

impl VideoInfo {
    pub fn parse(json: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(json)?)
    }
}

/// Runs the yt-dlp binary
#[derive(Debug, Clone)]
pub struct YtDlpAcquirer {
    binary: PathBuf,
    format: String,
}

impl YtDlpAcquirer {
    pub fn new(binary: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            format: format.into(),
        }
    }

    pub fn from_config(cfg: &IngestionConfig) -> Self {
        Self::new(cfg.ytdlp_binary.clone(), cfg.audio_format.clone())
    }

    /// Metadata only, nothing downloaded
    pub async fn video_info(&self, video_url: &str) -> Result<VideoInfo> {
        let stdout = self
            .run(&["--dump-single-json", "--skip-download", video_url])
            .await?;
        VideoInfo::parse(&stdout)
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        debug!("Running {} {:?}", self.binary.display(), args);

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                HarvestError::Acquisition(format!("failed to run {}: {}", self.binary.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HarvestError::Acquisition(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl MediaAcquirer for YtDlpAcquirer {
    async fn acquire_audio(&self, video_url: &str, work_dir: &Path) -> Result<AcquiredAudio> {
        let info = self.video_info(video_url).await?;
        let chapters = info.chapters.unwrap_or_default();
        if chapters.is_empty() {
            warn!("No chapters found for {}", video_url);
        }

        info!("🎵 Downloading audio for {}", video_url);
        let template = work_dir.join("%(id)s.%(ext)s");
        let template = template.to_string_lossy();
        self.run(&[
            "-f",
            self.format.as_str(),
            "--no-overwrites",
            "--no-continue",
            "--no-part",
            "-o",
            &*template,
            video_url,
        ])
        .await?;

        let path = find_downloaded_file(work_dir)?
            .ok_or_else(|| HarvestError::Acquisition(format!("no file downloaded for {}", video_url)))?;

        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .or(info.ext)
            .unwrap_or_else(|| "m4a".to_string());

        let video_id = info
            .id
            .or_else(|| video_id_from_url(video_url))
            .or_else(|| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
            .ok_or_else(|| HarvestError::Acquisition(format!("no video id for {}", video_url)))?;

        Ok(AcquiredAudio {
            path,
            video_id,
            extension,
            chapters,
        })
    }
}

/// First regular file in `dir`, by name
fn find_downloaded_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| HarvestError::Acquisition(e.to_string()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files.into_iter().next())
}
