//! Error taxonomy shared by discovery and ingestion

/// Result type for harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Error types for harvest operations
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Media acquisition failed: {0}")]
    Acquisition(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Video provider API error: {0}")]
    Api(String),

    #[error("Storage error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures that should only abort the current branch of work
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_message() {
        let err = HarvestError::fetch("https://ocw.mit.edu/courses/x/", "HTTP 503");
        assert_eq!(
            err.to_string(),
            "Failed to fetch https://ocw.mit.edu/courses/x/: HTTP 503"
        );
    }

    #[test]
    fn test_not_found_detection() {
        assert!(HarvestError::NotFound("channel @nobody".into()).is_not_found());
        assert!(!HarvestError::Config("missing bucket".into()).is_not_found());
    }
}
