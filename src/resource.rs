use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;
use uuid::Uuid;

/// Source label written on every course-site document
pub const OCW_SOURCE: &str = "MIT OCW";

/// Field holding the raw entry on records for unreadable manifest entries
pub const MANIFEST_ENTRY_FIELD: &str = "manifest_entry";

/// Kind of discovered resource
///
/// Kinds this build does not ingest keep their original label in `Other`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum ResourceType {
    Pdf,
    Video,
    Other(String),
}

impl ResourceType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pdf => "pdf",
            Self::Video => "video",
            Self::Other(label) => label.as_str(),
        }
    }
}

impl From<String> for ResourceType {
    fn from(label: String) -> Self {
        match label.as_str() {
            "pdf" => Self::Pdf,
            "video" => Self::Video,
            _ => Self::Other(label),
        }
    }
}

impl From<ResourceType> for String {
    fn from(kind: ResourceType) -> Self {
        match kind {
            ResourceType::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

/// Classification of a resource's content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(from = "String", into = "String")]
pub enum ResourceSubtype {
    Slides,
    Notes,
    Lecture,
    #[default]
    Unknown,
    Other(String),
}

impl ResourceSubtype {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Slides => "slides",
            Self::Notes => "notes",
            Self::Lecture => "lecture",
            Self::Unknown => "unknown",
            Self::Other(label) => label.as_str(),
        }
    }
}

impl From<String> for ResourceSubtype {
    fn from(label: String) -> Self {
        match label.as_str() {
            "slides" => Self::Slides,
            "notes" => Self::Notes,
            "lecture" => Self::Lecture,
            "unknown" => Self::Unknown,
            _ => Self::Other(label),
        }
    }
}

impl From<ResourceSubtype> for String {
    fn from(subtype: ResourceSubtype) -> Self {
        match subtype {
            ResourceSubtype::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

/// One discovered document or video with its discovery metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    /// Absolute source location
    pub url: String,

    #[serde(rename = "type")]
    pub kind: ResourceType,

    #[serde(default)]
    pub subtype: ResourceSubtype,

    /// Video title as reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Course the document was crawled from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_handle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Page on which a document link was found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_handle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_title: Option<String>,

    /// Upstream publish timestamp, kept verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,

    #[serde(with = "timestamp")]
    pub discovered_at: DateTime<Utc>,

    /// Manifest fields this build has no typed slot for, carried through unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Resource {
    /// A document link found while crawling a course site
    pub fn document(
        url: impl Into<String>,
        subtype: ResourceSubtype,
        course_handle: &str,
        page_url: &str,
    ) -> Self {
        Self {
            url: url.into(),
            kind: ResourceType::Pdf,
            subtype,
            title: None,
            course_handle: Some(course_handle.to_string()),
            source: Some(OCW_SOURCE.to_string()),
            page_url: Some(page_url.to_string()),
            channel_handle: None,
            playlist_title: None,
            published_at: None,
            discovered_at: Utc::now(),
            extra: Map::new(),
        }
    }

    /// A lecture video listed in a channel playlist
    pub fn video(
        video_id: &str,
        title: impl Into<String>,
        channel_handle: &str,
        playlist_title: &str,
        published_at: Option<String>,
    ) -> Self {
        Self {
            url: format!("https://www.youtube.com/watch?v={}", video_id),
            kind: ResourceType::Video,
            subtype: ResourceSubtype::Lecture,
            title: Some(title.into()),
            course_handle: None,
            source: None,
            page_url: None,
            channel_handle: Some(channel_handle.to_string()),
            playlist_title: Some(playlist_title.to_string()),
            published_at,
            discovered_at: Utc::now(),
            extra: Map::new(),
        }
    }

    /// Stand-in for a manifest entry that does not parse as a resource.
    ///
    /// Readable fields are lifted out; the raw entry is kept whole under
    /// `manifest_entry`. `discovered_at` falls back to now when absent or invalid.
    pub fn unreadable(entry: Value) -> Self {
        let text = |name: &str| entry.get(name).and_then(Value::as_str).map(str::to_string);

        let url = text("url").unwrap_or_default();
        let kind = ResourceType::from(text("type").unwrap_or_default());
        let discovered_at = text("discovered_at")
            .and_then(|raw| timestamp::parse(&raw))
            .unwrap_or_else(Utc::now);

        let mut extra = Map::new();
        extra.insert(MANIFEST_ENTRY_FIELD.to_string(), entry);

        Self {
            url,
            kind,
            subtype: ResourceSubtype::Unknown,
            title: None,
            course_handle: None,
            source: None,
            page_url: None,
            channel_handle: None,
            playlist_title: None,
            published_at: None,
            discovered_at,
            extra,
        }
    }

    /// Which discovery path produced this resource
    pub fn origin(&self) -> String {
        match (&self.course_handle, &self.channel_handle, &self.playlist_title) {
            (Some(course), _, _) => course.clone(),
            (None, Some(channel), Some(playlist)) => format!("{} / {}", channel, playlist),
            (None, Some(channel), None) => channel.clone(),
            _ => "unknown".to_string(),
        }
    }
}

/// Stable identifier for a video URL (`watch?v=`, `youtu.be/` or `/shorts/` forms)
pub fn video_id_from_url(video_url: &str) -> Option<String> {
    let parsed = Url::parse(video_url).ok()?;

    if let Some(id) = parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
    {
        return (!id.is_empty()).then_some(id);
    }

    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(|segment| segment.to_string())
}

/// Outcome of ingesting one resource
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    Success,
    Failed,
    Skipped,
}

/// A resource annotated with its ingestion outcome
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestionRecord {
    #[serde(flatten)]
    pub resource: Resource,

    pub status: IngestionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapters_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl IngestionRecord {
    pub fn success(resource: Resource, s3_key: String, chapters_key: Option<String>) -> Self {
        Self {
            resource,
            status: IngestionStatus::Success,
            reason: None,
            s3_key: Some(s3_key),
            chapters_key,
            uploaded_at: Some(Utc::now()),
        }
    }

    pub fn failed(resource: Resource, reason: impl Into<String>) -> Self {
        Self::without_upload(resource, IngestionStatus::Failed, reason.into())
    }

    pub fn skipped(resource: Resource, reason: impl Into<String>) -> Self {
        Self::without_upload(resource, IngestionStatus::Skipped, reason.into())
    }

    fn without_upload(resource: Resource, status: IngestionStatus, reason: String) -> Self {
        Self {
            resource,
            status,
            reason: Some(reason),
            s3_key: None,
            chapters_key: None,
            uploaded_at: None,
        }
    }
}

/// Aggregate record of one ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub job_id: Uuid,
    pub ingested_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub num_total: usize,
    pub num_success: usize,
    pub num_failed: usize,
    pub num_skipped: usize,
    pub resources: Vec<IngestionRecord>,
}

impl IngestionJob {
    /// Derive the counts from the records and close the job
    pub fn finalize(job_id: Uuid, started_at: DateTime<Utc>, resources: Vec<IngestionRecord>) -> Self {
        let finished_at = Utc::now();
        let count = |status: IngestionStatus| resources.iter().filter(|r| r.status == status).count();

        Self {
            job_id,
            ingested_at: started_at,
            finished_at,
            duration_seconds: (finished_at - started_at).num_milliseconds() as f64 / 1000.0,
            num_total: resources.len(),
            num_success: count(IngestionStatus::Success),
            num_failed: count(IngestionStatus::Failed),
            num_skipped: count(IngestionStatus::Skipped),
            resources,
        }
    }
}

/// Object key layout for everything the pipeline writes
pub mod keys {
    use chrono::{DateTime, Utc};

    fn join(prefix: &str, name: &str) -> String {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        }
    }

    /// `urls/discovered_<YYYYMMDD-HHMMSS>.json`
    pub fn discovery_manifest(prefix: &str, at: DateTime<Utc>) -> String {
        join(prefix, &format!("discovered_{}.json", at.format("%Y%m%d-%H%M%S")))
    }

    /// `metadata/ingestion/ingestion_<ISO8601>.json`
    pub fn ingestion_metadata(prefix: &str, at: DateTime<Utc>) -> String {
        join(prefix, &format!("ingestion_{}.json", at.format("%Y-%m-%dT%H:%M:%S%.6f")))
    }

    pub fn audio(prefix: &str, video_id: &str, ext: &str) -> String {
        join(prefix, &format!("{}.{}", video_id, ext))
    }

    pub fn chapters(prefix: &str, video_id: &str) -> String {
        join(prefix, &format!("{}_chapters.json", video_id))
    }

    /// True for keys written by `discovery_manifest`
    pub fn is_discovery_manifest(key: &str) -> bool {
        key.rsplit('/')
            .next()
            .map_or(false, |name| name.starts_with("discovered_") && name.ends_with(".json"))
    }
}

/// Accepts RFC 3339 as well as naive ISO timestamps (assumed UTC) from older manifests
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_extraction() {
        assert_eq!(
            video_id_from_url("https://www.youtube.com/watch?v=kM9ASKAni_s").as_deref(),
            Some("kM9ASKAni_s")
        );
        assert_eq!(
            video_id_from_url("https://youtu.be/xLetJpcjHS0?si=1E_HVW610YABWORa").as_deref(),
            Some("xLetJpcjHS0")
        );
        assert_eq!(video_id_from_url("not a url"), None);
    }

    #[test]
    fn test_origin() {
        let doc = Resource::document(
            "https://ocw.mit.edu/a.pdf",
            ResourceSubtype::Notes,
            "6-006-introduction-to-algorithms-spring-2020",
            "https://ocw.mit.edu/courses/6-006-introduction-to-algorithms-spring-2020/",
        );
        assert_eq!(doc.origin(), "6-006-introduction-to-algorithms-spring-2020");

        let video = Resource::video("abc", "Lecture 1", "@mitocw", "Lecture Videos", None);
        assert_eq!(video.origin(), "@mitocw / Lecture Videos");
        assert_eq!(video.url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(video.subtype, ResourceSubtype::Lecture);
    }

    #[test]
    fn test_reads_legacy_manifest_entry() {
        let json = r#"{
            "url": "https://www.youtube.com/watch?v=abc",
            "title": "Lecture 1",
            "playlist_title": "Lecture Videos",
            "channel_handle": "@mitocw",
            "published_at": "2020-01-01T00:00:00Z",
            "discovered_at": "2025-09-24T20:20:15.123456",
            "type": "video",
            "subtype": "lecture"
        }"#;
        let resource: Resource = serde_json::from_str(json).unwrap();
        assert_eq!(resource.kind, ResourceType::Video);
        assert_eq!(resource.discovered_at.timestamp(), 1758745215);
    }

    #[test]
    fn test_unrecognised_labels_and_fields_survive_roundtrip() {
        let json = r#"{"url": "https://example.com/x", "type": "podcast", "subtype": "episode",
                       "discovered_at": "2025-01-01T00:00:00Z", "duration": 3600, "host": {"name": "ocw"}}"#;
        let resource: Resource = serde_json::from_str(json).unwrap();
        assert_eq!(resource.kind, ResourceType::Other("podcast".to_string()));
        assert_eq!(resource.subtype, ResourceSubtype::Other("episode".to_string()));
        assert_eq!(resource.extra["duration"], 3600);

        let value = serde_json::to_value(&resource).unwrap();
        assert_eq!(value["type"], "podcast");
        assert_eq!(value["subtype"], "episode");
        assert_eq!(value["host"]["name"], "ocw");
    }

    #[test]
    fn test_known_labels_map_to_variants() {
        assert_eq!(ResourceType::from("pdf".to_string()), ResourceType::Pdf);
        assert_eq!(String::from(ResourceType::Video), "video");
        assert_eq!(ResourceSubtype::from("unknown".to_string()), ResourceSubtype::Unknown);
        assert_eq!(ResourceSubtype::Slides.as_str(), "slides");
    }

    #[test]
    fn test_unreadable_entry_keeps_raw_fields() {
        let entry = serde_json::json!({"url": "https://www.youtube.com/watch?v=abc", "type": "video", "title": 7});
        let resource = Resource::unreadable(entry.clone());

        assert_eq!(resource.url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(resource.kind, ResourceType::Video);
        assert!(resource.title.is_none());
        assert_eq!(resource.extra[MANIFEST_ENTRY_FIELD], entry);

        let value = serde_json::to_value(&resource).unwrap();
        assert_eq!(value[MANIFEST_ENTRY_FIELD]["title"], 7);
    }

    #[test]
    fn test_record_with_extra_fields_roundtrips() {
        let mut video = Resource::video("abc", "Lecture 1", "@mitocw", "Lecture Videos", None);
        video.extra.insert("batch".to_string(), Value::from("2025-fall"));
        let record = IngestionRecord::skipped(video, "unknown type");

        let json = serde_json::to_string(&record).unwrap();
        let back: IngestionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert!(!back.resource.extra.contains_key("status"));
    }

    #[test]
    fn test_record_serialization_flattens_resource() {
        let video = Resource::video("abc", "Lecture 1", "@mitocw", "Lecture Videos", None);
        let record = IngestionRecord::failed(video, "yt-dlp exited with status 1");
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["type"], "video");
        assert_eq!(value["status"], "failed");
        assert_eq!(value["reason"], "yt-dlp exited with status 1");
        assert!(value.get("s3_key").is_none());
    }

    #[test]
    fn test_job_counts_partition_records() {
        let video = Resource::video("abc", "Lecture 1", "@mitocw", "Lecture Videos", None);
        let records = vec![
            IngestionRecord::success(video.clone(), "audio/abc.m4a".into(), None),
            IngestionRecord::failed(video.clone(), "boom"),
            IngestionRecord::skipped(video, "unknown type"),
        ];
        let job = IngestionJob::finalize(Uuid::new_v4(), Utc::now(), records);

        assert_eq!(job.num_total, 3);
        assert_eq!(job.num_success + job.num_failed + job.num_skipped, job.num_total);
    }

    #[test]
    fn test_key_layout() {
        let at = DateTime::parse_from_rfc3339("2025-09-24T20:20:15.5Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(keys::discovery_manifest("urls", at), "urls/discovered_20250924-202015.json");
        assert_eq!(
            keys::ingestion_metadata("metadata/ingestion/", at),
            "metadata/ingestion/ingestion_2025-09-24T20:20:15.500000.json"
        );
        assert_eq!(keys::audio("audio/", "abc", "m4a"), "audio/abc.m4a");
        assert_eq!(keys::chapters("audio", "abc"), "audio/abc_chapters.json");
        assert!(keys::is_discovery_manifest("urls/discovered_20250924-202015.json"));
        assert!(!keys::is_discovery_manifest("urls/notes.txt"));
    }
}
