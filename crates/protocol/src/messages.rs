use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Asks whether one chunk is already stored remotely.
///
/// Sent as query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkQuery {
    pub identifier: String,
    pub chunk_number: u32,
}

/// Metadata sent alongside the bytes of one chunk.
///
/// Field names match the form fields the storage endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadMeta {
    pub identifier: String,
    /// 1-based sequence number.
    pub chunk_number: u32,
    /// Configured chunk size for the session.
    pub chunk_size: u64,
    /// Actual byte length of this chunk (the last one may be short).
    pub current_chunk_size: u64,
    pub total_size: u64,
    pub filename: String,
    pub total_chunks: u32,
    pub media_type: String,
    pub relative_path: String,
}

impl ChunkUploadMeta {
    /// Flattens the metadata into `(field, value)` pairs for a form body.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("identifier", self.identifier.clone()),
            ("chunkNumber", self.chunk_number.to_string()),
            ("chunkSize", self.chunk_size.to_string()),
            ("currentChunkSize", self.current_chunk_size.to_string()),
            ("totalSize", self.total_size.to_string()),
            ("filename", self.filename.clone()),
            ("totalChunks", self.total_chunks.to_string()),
            ("mediaType", self.media_type.clone()),
            ("relativePath", self.relative_path.clone()),
        ]
    }
}

/// Asks the backend to assemble all chunks of `identifier` into one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub identifier: String,
    pub filename: String,
    pub total_chunks: u32,
    pub relative_path: String,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// `data` of a merge response.
///
/// Older backend builds return the URL as a bare string, newer ones wrap it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MergeData {
    Url(String),
    Object { url: String },
}

impl MergeData {
    pub fn into_url(self) -> String {
        match self {
            Self::Url(url) | Self::Object { url } => url,
        }
    }
}
