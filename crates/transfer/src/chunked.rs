use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::planner::ChunkRange;
use crate::{TransferError, guess_media_type};

/// Reads `range` from the file at `path` with blocking I/O.
pub fn read_file_range(path: &Path, range: &ChunkRange) -> Result<Vec<u8>, TransferError> {
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(range.start))?;

    let expected = range.len();
    let mut buf = Vec::with_capacity(expected as usize);
    let n = file.take(expected).read_to_end(&mut buf)? as u64;
    if n != expected {
        return Err(TransferError::ShortRead {
            chunk: range.number,
            expected,
            actual: n,
        });
    }
    Ok(buf)
}

#[derive(Debug, Clone)]
enum Body {
    Path(PathBuf),
    Memory(Arc<[u8]>),
}

/// A file selected for upload.
///
/// Cheap to clone: on-disk files are re-opened per chunk, in-memory
/// bodies are shared.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    size: u64,
    media_type: String,
    body: Body,
}

impl SourceFile {
    /// Opens a file on disk. The media type is guessed from the extension.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(TransferError::InvalidPath(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransferError::InvalidFilename(path.display().to_string()))?;
        crate::validate_filename(&name)?;

        let media_type = guess_media_type(&name);
        tracing::debug!(
            path = %path.display(),
            size = meta.len(),
            media_type,
            "opened source file"
        );
        Ok(Self {
            media_type: media_type.to_string(),
            name,
            size: meta.len(),
            body: Body::Path(path.to_path_buf()),
        })
    }

    /// Wraps an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let data: Arc<[u8]> = Arc::from(data.into());
        Self {
            media_type: guess_media_type(&name).to_string(),
            size: data.len() as u64,
            name,
            body: Body::Memory(data),
        }
    }

    /// Overrides the guessed media type.
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Loads the bytes of one chunk.
    ///
    /// Disk reads run on the blocking pool so the scheduler's task keeps
    /// polling other in-flight chunks.
    pub async fn read_chunk(&self, range: ChunkRange) -> Result<Vec<u8>, TransferError> {
        match &self.body {
            Body::Memory(data) => {
                let start = range.start as usize;
                let end = range.end as usize;
                data.get(start..end)
                    .map(<[u8]>::to_vec)
                    .ok_or(TransferError::ShortRead {
                        chunk: range.number,
                        expected: range.len(),
                        actual: (data.len().saturating_sub(start)) as u64,
                    })
            }
            Body::Path(path) => {
                tracing::trace!(
                    chunk = range.number,
                    start = range.start,
                    len = range.len(),
                    "reading chunk"
                );
                let path = path.clone();
                tokio::task::spawn_blocking(move || read_file_range(&path, &range)).await?
            }
        }
    }
}
