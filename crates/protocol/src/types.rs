use serde::{Deserialize, Serialize};

/// Storage category of an uploaded asset, derived from its MIME type.
///
/// The category is the first segment of the remote relative path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    Video,
    Audio,
    Image,
    Other,
}

impl MediaCategory {
    /// Classifies a MIME type by its prefix (`video/`, `audio/`, `image/`).
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("video/") {
            Self::Video
        } else if mime.starts_with("audio/") {
            Self::Audio
        } else if mime.starts_with("image/") {
            Self::Image
        } else {
            Self::Other
        }
    }

    /// Path segment used on the storage side.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a chunked upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Preparing,
    Uploading,
    Paused,
    Completed,
    Error,
}

impl UploadStatus {
    /// `true` once the session can make no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Point-in-time view of an upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub identifier: String,
    pub filename: String,
    pub status: UploadStatus,
    /// Percentage of confirmed chunks, 0-100.
    pub progress: u8,
    pub uploaded_chunks: u32,
    pub total_chunks: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}
